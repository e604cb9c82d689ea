use pacemaker_core::interfaces::AdminCommand;

use crate::orchestrator::Orchestrator;

/// Execute an already-authorized [`AdminCommand`] and render a human-readable
/// status line (spec §4.8, §6 admin control surface). Admin commands bypass
/// the queue entirely and are answered synchronously.
pub async fn dispatch(orchestrator: &Orchestrator, command: AdminCommand) -> String {
    match command {
        AdminCommand::QueueStatus => {
            let ids = orchestrator.queue.context_ids();
            let mut lines = vec![format!("total processed: {}", orchestrator.queue.total_processed())];
            for id in ids {
                lines.push(format!("  {} — {} queued", id, orchestrator.queue.queue_len(&id)));
            }
            lines.join("\n")
        }
        AdminCommand::QueueFlush { context_id } => match context_id {
            Some(id) => {
                let outcome = orchestrator.queue.flush(&id, pacemaker_core::types::FlushReason::Manual).await;
                format!("flush {id}: {outcome:?}")
            }
            None => {
                orchestrator.queue.flush_all().await;
                "flushed all contexts".to_string()
            }
        },
        AdminCommand::QueueClear => {
            orchestrator.queue.clear();
            "queue cleared".to_string()
        }
        AdminCommand::StaminaStatus => {
            let snapshot = orchestrator.stamina.snapshot();
            format!(
                "stamina: {:.1}/{:.1} ({:?}), momentum {:.2}, rest_mode={}",
                snapshot.current, snapshot.s_max, snapshot.level, snapshot.momentum, snapshot.rest_mode
            )
        }
        AdminCommand::StaminaRest(rest_mode) => {
            orchestrator.stamina.set_rest_mode(rest_mode);
            format!("rest mode set to {rest_mode}")
        }
        AdminCommand::StaminaSet(value) => {
            orchestrator.stamina.set_current(value);
            format!("stamina current forced to {value}")
        }
        AdminCommand::ApiKeysStatus => {
            let statuses = orchestrator.credentials.statuses();
            statuses
                .iter()
                .map(|s| format!("{} — errors={} blocked={}", s.masked_secret, s.error_count, s.blocked))
                .collect::<Vec<_>>()
                .join("\n")
        }
        AdminCommand::ApiKeysReset { prefix } => match orchestrator.credentials.force_reset(&prefix) {
            Ok(()) => format!("credential {prefix} reset"),
            Err(e) => format!("reset failed: {e}"),
        },
        AdminCommand::ApiKeysSwitch => {
            orchestrator.credentials.force_advance();
            "credential rotation advanced".to_string()
        }
        AdminCommand::Start => {
            orchestrator.group_stopped.store(false, std::sync::atomic::Ordering::SeqCst);
            "group processing resumed".to_string()
        }
        AdminCommand::Stop => {
            orchestrator.group_stopped.store(true, std::sync::atomic::Ordering::SeqCst);
            "group processing stopped".to_string()
        }
    }
}
