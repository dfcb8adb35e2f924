//! Command orchestration helpers from UI actions to backend command queue.

use crossbeam_channel::{Sender, TrySendError};

use crate::backend_bridge::commands::BackendCommand;
use crate::controller::events::{UiError, UiErrorContext};

pub fn dispatch_backend_command(
    cmd_tx: &Sender<BackendCommand>,
    cmd: BackendCommand,
) -> Result<(), UiError> {
    let cmd_name = cmd.name();
    let session = cmd.session_id();

    match cmd_tx.try_send(cmd) {
        Ok(()) => {
            tracing::debug!(command = cmd_name, %session, "queued ui->backend command");
            Ok(())
        }
        Err(TrySendError::Full(_)) => Err(UiError::from_message(
            UiErrorContext::General,
            "UI command queue is full; please retry",
        )),
        Err(TrySendError::Disconnected(_)) => Err(UiError::from_message(
            UiErrorContext::BackendStartup,
            "Backend command processor disconnected (possible startup/runtime failure); restart the app",
        )),
    }
}
