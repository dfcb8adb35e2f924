//! Prompt composition for story generation.

use shared::{
    domain::FormInput,
    protocol::{Content, GenerateContentRequest, GenerationConfig},
};

pub const SYSTEM_INSTRUCTION: &str = "你是一位专业的小说家，擅长各种题材的文学创作。";
pub const GENERATION_TEMPERATURE: f32 = 0.8;

/// Everything the provider needs for one streamed generation.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    pub system_instruction: String,
    pub temperature: f32,
}

impl GenerationRequest {
    pub fn from_form(model: impl Into<String>, form: &FormInput) -> Self {
        Self {
            model: model.into(),
            prompt: build_prompt(form),
            system_instruction: SYSTEM_INSTRUCTION.to_string(),
            temperature: GENERATION_TEMPERATURE,
        }
    }
}

impl From<&GenerationRequest> for GenerateContentRequest {
    fn from(request: &GenerationRequest) -> Self {
        Self {
            contents: vec![Content::user_text(request.prompt.clone())],
            system_instruction: Some(Content::instruction(request.system_instruction.clone())),
            generation_config: GenerationConfig {
                temperature: request.temperature,
            },
        }
    }
}

pub fn build_prompt(form: &FormInput) -> String {
    let genre_label = form.genre.label();
    let target_words = form.target_length.target_words();
    let outline = &form.outline;

    format!(
        "你是一位顶级的畅销书小说家。请根据以下要求创作一篇小说：

题材：{genre_label}
目标字数：大约 {target_words} 字
故事大纲：
{outline}

要求：
1. **必须包含一个吸引人的小说标题**（放在最开头，使用一级标题格式）。
2. **必须按照章节结构进行创作**（例如：第一章、第二章等，使用二级标题格式）。
3. 文笔流畅，富有感染力，符合所选题材的风格。
4. 结构完整，包含起承转合。
5. 人物形象生动，对话自然。
6. 请直接输出小说内容，不需要任何额外的解释或开场白。"
    )
}
