//! Backend commands queued from UI to backend worker.

use client_core::GenerationTicket;
use shared::domain::SessionId;

pub enum BackendCommand {
    Generate(GenerationTicket),
}

impl BackendCommand {
    pub fn name(&self) -> &'static str {
        match self {
            BackendCommand::Generate(_) => "generate",
        }
    }

    pub fn session_id(&self) -> SessionId {
        match self {
            BackendCommand::Generate(ticket) => ticket.session_id,
        }
    }
}
