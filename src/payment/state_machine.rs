//! Payment lifecycle state machine.
//!
//! `handle` is the single entry point for both wire surfaces: it routes an
//! incoming message onto the free, payment-required, or paid execution path
//! and drives the task through the x402 substates. Executor calls run outside
//! every lock, and a task re-read after execution keeps cancelled tasks
//! cancelled.

use serde_json::json;
use tracing::{info, warn};

use crate::catalog::{self, Skill};
use crate::executor::SkillOutput;
use crate::models::AppState;
use crate::parser::{parse_request, SkillRequest};
use crate::requirements;
use crate::store::events::EventKind;
use crate::store::tasks::Claim;
use crate::types::{
    new_id, AppError, AppResult, Message, Part, PaymentMeta, PaymentPayload, PaymentStatus,
    Receipt, Task, TaskState,
};

/// Combined view of message-level and request-level metadata; the message
/// wins where both carry a value.
struct MetaView {
    status: Option<PaymentStatus>,
    payload: Option<PaymentPayload>,
    wallet: Option<String>,
    payer: Option<String>,
}

impl MetaView {
    fn merge(message: Option<&PaymentMeta>, request: Option<&PaymentMeta>) -> Self {
        let pick = |f: fn(&PaymentMeta) -> Option<&PaymentPayload>| {
            message.and_then(f).or_else(|| request.and_then(f)).cloned()
        };
        Self {
            status: message
                .and_then(|m| m.status)
                .or_else(|| request.and_then(|m| m.status)),
            payload: pick(PaymentMeta::attached_payload),
            wallet: message
                .and_then(|m| m.session_wallet())
                .or_else(|| request.and_then(|m| m.session_wallet()))
                .map(str::to_string),
            payer: message
                .and_then(|m| m.payer.as_deref())
                .or_else(|| request.and_then(|m| m.payer.as_deref()))
                .filter(|p| !p.is_empty())
                .map(str::to_string),
        }
    }
}

/// Run one message through the state machine and return the resulting task.
pub async fn handle(
    state: &AppState,
    message: Message,
    request_meta: Option<PaymentMeta>,
) -> AppResult<Task> {
    let text = message
        .text()
        .ok_or_else(|| AppError::InvalidRequest("message has no text part".to_string()))?
        .to_string();

    let meta = MetaView::merge(message.metadata.as_ref(), request_meta.as_ref());

    // Correlated messages: an existing task referenced by id.
    if let Some(task_id) = message.task_id.clone() {
        if let Some(existing) = state.tasks.get(&task_id) {
            if meta.status == Some(PaymentStatus::PaymentRejected) {
                return Ok(reject_payment(state, existing, message));
            }
            if meta.status == Some(PaymentStatus::PaymentSubmitted) || meta.payload.is_some() {
                let payload = meta.payload.clone().ok_or_else(|| {
                    AppError::InvalidRequest(
                        "payment-submitted without a payment payload".to_string(),
                    )
                })?;
                state.tasks.append_history(&existing.id, message);
                return execute_paid(state, existing, payload, meta.payer.clone())
                    .await
                    .map(|run| run.task);
            }
        }
    }

    // New interaction.
    let request = parse_request(&text);
    let skill = catalog::skill(request.skill_id())
        .ok_or_else(|| AppError::Internal(format!("unknown skill {}", request.skill_id())))?;
    let task = create_task(state, &message, &request, skill);
    info!(task_id = %task.id, skill = skill.id, "Task created");

    if skill.requires_payment() {
        if let Some(payload) = meta.payload.clone() {
            return execute_paid(state, task, payload, meta.payer.clone())
                .await
                .map(|run| run.task);
        }
        if let Some(wallet) = meta.wallet.as_deref() {
            let has_session = {
                let ledger = state.ledger.read().unwrap();
                ledger.sessions.has(wallet, skill.id)
            };
            if has_session {
                {
                    let mut ledger = state.ledger.write().unwrap();
                    ledger.events.append(
                        EventKind::SiwxAccess,
                        &task.id,
                        skill.id,
                        Some(wallet),
                        None,
                    );
                }
                info!(task_id = %task.id, wallet, "Session grants free reuse");
                return run_free(state, task, request).await;
            }
        }
        return Ok(require_payment(state, task, skill));
    }

    run_free(state, task, request).await
}

pub(crate) fn create_task(
    state: &AppState,
    message: &Message,
    request: &SkillRequest,
    skill: &Skill,
) -> Task {
    let context_id = message.context_id.clone().unwrap_or_else(new_id);
    let mut task = Task::new(new_id(), context_id, TaskState::Submitted);
    task.metadata.skill = Some(skill.id.to_string());
    task.metadata.request = Some(request.clone());
    task.history.push(message.clone());
    {
        let mut ledger = state.ledger.write().unwrap();
        ledger.count_task();
    }
    state.tasks.create(task)
}

/// Client refused to pay: cancel the task and log the rejection.
fn reject_payment(state: &AppState, task: Task, message: Message) -> Task {
    let skill = task.metadata.skill.clone().unwrap_or_default();
    state.tasks.append_history(&task.id, message);
    let updated = state
        .tasks
        .transition(&task.id, TaskState::Canceled, None, |m| {
            m.payment_status = Some(PaymentStatus::PaymentRejected);
        })
        .unwrap_or(task);
    {
        let mut ledger = state.ledger.write().unwrap();
        ledger
            .events
            .append(EventKind::PaymentRejected, &updated.id, &skill, None, None);
    }
    info!(task_id = %updated.id, "Payment rejected by client");
    updated
}

/// Priced skill, no payment, no session: park the task in `input-required`
/// with the requirements attached.
fn require_payment(state: &AppState, task: Task, skill: &Skill) -> Task {
    let reqs = requirements::build(
        skill,
        &state.config.payment.payee_address,
        &state.config.server.public_url,
    )
    .expect("priced skill always has requirements");

    let mut meta = PaymentMeta {
        status: Some(PaymentStatus::PaymentRequired),
        ..Default::default()
    };
    meta.extra.insert(
        "x402PaymentRequired".to_string(),
        json!({ "version": 1, "accepts": reqs.accepts.clone() }),
    );
    let prompt = format!(
        "Payment of {} is required for {}. Resubmit with taskId {} and a signed payment payload.",
        catalog::price_display(skill.price_smallest_unit),
        skill.id,
        task.id,
    );
    let reply = Message::agent(vec![Part::Text { text: prompt }], Some(meta));

    let accepts = reqs.accepts;
    let updated = state
        .tasks
        .transition(&task.id, TaskState::InputRequired, Some(reply), |m| {
            m.payment_status = Some(PaymentStatus::PaymentRequired);
            m.accepts = Some(accepts);
        })
        .unwrap_or(task);

    // The task is in the store before this event is logged.
    {
        let mut ledger = state.ledger.write().unwrap();
        ledger.events.append(
            EventKind::PaymentRequired,
            &updated.id,
            skill.id,
            None,
            None,
        );
    }
    info!(task_id = %updated.id, skill = skill.id, "Payment required");
    updated
}

/// Outcome of a paid run. `delivery` carries the raw output and settlement id
/// on success, for surfaces (REST) that return the body directly.
pub(crate) struct PaidRun {
    pub task: Task,
    pub delivery: Option<(SkillOutput, String)>,
}

/// Paid execution: verify, execute, settle, receipt.
pub(crate) async fn execute_paid(
    state: &AppState,
    task: Task,
    payload: PaymentPayload,
    payer_hint: Option<String>,
) -> AppResult<PaidRun> {
    let skill_id = task
        .metadata
        .skill
        .clone()
        .unwrap_or_else(|| "markdown-to-html".to_string());
    let skill = catalog::skill(&skill_id)
        .ok_or_else(|| AppError::Internal(format!("unknown skill {skill_id}")))?;
    let request = match task.metadata.request.clone() {
        Some(r) => r,
        None => {
            let text = task
                .history
                .first()
                .and_then(|m| m.text())
                .unwrap_or_default();
            parse_request(text)
        }
    };

    // The submitted network must be one the task was quoted.
    let reqs = requirements::build(
        skill,
        &state.config.payment.payee_address,
        &state.config.server.public_url,
    )
    .ok_or_else(|| AppError::InvalidRequest(format!("skill {skill_id} is not priced")))?;
    let quoted = task.metadata.accepts.as_ref().unwrap_or(&reqs.accepts);
    if !quoted.iter().any(|a| a.network == payload.network) {
        return Err(AppError::InvalidRequest(format!(
            "network {} is not among the accepted networks",
            payload.network
        )));
    }

    // At most one resubmission wins; the loser sees the task as it stands.
    let task = match state.tasks.claim(
        &task.id,
        &[TaskState::Submitted, TaskState::InputRequired],
        TaskState::Working,
    ) {
        Claim::Won(t) => t,
        Claim::Lost(current) => {
            info!(task_id = %current.id, "Concurrent payment already in flight, returning current task");
            return Ok(PaidRun {
                task: current,
                delivery: None,
            });
        }
        Claim::Missing => return Err(AppError::TaskNotFound(task.id)),
    };

    let wallet = payload
        .payer()
        .map(str::to_string)
        .or(payer_hint)
        .unwrap_or_default();
    let network = payload.network.clone();

    {
        let mut ledger = state.ledger.write().unwrap();
        ledger.events.append(
            EventKind::PaymentReceived,
            &task.id,
            skill.id,
            Some(&wallet),
            Some(&network),
        );
        ledger.events.append(
            EventKind::PaymentVerified,
            &task.id,
            skill.id,
            Some(&wallet),
            Some(&network),
        );
    }
    state
        .tasks
        .transition(&task.id, TaskState::Working, None, |m| {
            m.payment_status = Some(PaymentStatus::PaymentVerified);
        });

    // Executor runs with no lock held.
    let outcome = state.executors.run(&request).await;

    // A task cancelled mid-flight stays cancelled; the result is discarded.
    if let Some(current) = state.tasks.get(&task.id) {
        if current.status.state == TaskState::Canceled {
            warn!(task_id = %task.id, "Task cancelled during execution, discarding result");
            return Ok(PaidRun {
                task: current,
                delivery: None,
            });
        }
    }

    match outcome {
        Ok(output) => match state.facilitator.verify_and_settle(&payload, &reqs).await {
            Ok(tx) => {
                let task = settle_success(
                    state,
                    &task.id,
                    skill,
                    output.clone(),
                    &wallet,
                    &network,
                    tx.clone(),
                );
                Ok(PaidRun {
                    task,
                    delivery: Some((output, tx)),
                })
            }
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Settlement failed after execution");
                Ok(PaidRun {
                    task: settle_failure(state, &task.id, &wallet, &network, e.to_string()),
                    delivery: None,
                })
            }
        },
        Err(e) => {
            warn!(task_id = %task.id, skill = skill.id, error = %e, "Paid executor failed");
            Ok(PaidRun {
                task: settle_failure(state, &task.id, &wallet, &network, e.to_string()),
                delivery: None,
            })
        }
    }
}

fn settle_success(
    state: &AppState,
    task_id: &str,
    skill: &Skill,
    output: SkillOutput,
    wallet: &str,
    network: &str,
    tx: String,
) -> Task {
    {
        let mut ledger = state.ledger.write().unwrap();
        ledger.events.append(
            EventKind::PaymentSettled,
            task_id,
            skill.id,
            Some(wallet),
            Some(network),
        );
        // A session entry exists iff a settlement was logged for the pair.
        if !wallet.is_empty() {
            ledger.sessions.record(wallet, skill.id);
        }
    }

    let receipt = Receipt {
        success: true,
        transaction: Some(tx.clone()),
        network: network.to_string(),
        payer: wallet.to_string(),
        error_reason: None,
    };
    let mut reply_meta = PaymentMeta {
        status: Some(PaymentStatus::PaymentCompleted),
        ..Default::default()
    };
    reply_meta
        .extra
        .insert("receipts".to_string(), json!([receipt.clone()]));
    let part = output.into_part(&format!("{}-{}", skill.id, task_id));
    let reply = Message::agent(vec![part], Some(reply_meta));

    let receipts = vec![receipt];
    info!(task_id, tx = %tx, "Paid task completed");
    state
        .tasks
        .transition(task_id, TaskState::Completed, Some(reply), |m| {
            m.payment_status = Some(PaymentStatus::PaymentCompleted);
            m.receipts = Some(receipts);
            m.transaction_id = Some(tx);
        })
        .unwrap_or_else(|| Task::new(task_id.to_string(), new_id(), TaskState::Completed))
}

fn settle_failure(
    state: &AppState,
    task_id: &str,
    wallet: &str,
    network: &str,
    reason: String,
) -> Task {
    let receipt = Receipt {
        success: false,
        transaction: None,
        network: network.to_string(),
        payer: wallet.to_string(),
        error_reason: Some(reason.clone()),
    };
    let mut reply_meta = PaymentMeta {
        status: Some(PaymentStatus::PaymentFailed),
        ..Default::default()
    };
    reply_meta
        .extra
        .insert("receipts".to_string(), json!([receipt.clone()]));
    let reply = Message::agent(
        vec![Part::Text {
            text: format!("Execution failed: {reason}"),
        }],
        Some(reply_meta),
    );

    let receipts = vec![receipt];
    state
        .tasks
        .transition(task_id, TaskState::Failed, Some(reply), |m| {
            m.payment_status = Some(PaymentStatus::PaymentFailed);
            m.receipts = Some(receipts);
        })
        .unwrap_or_else(|| Task::new(task_id.to_string(), new_id(), TaskState::Failed))
}

/// Free execution: run the executor, no payment machinery, no receipts.
async fn run_free(state: &AppState, task: Task, request: SkillRequest) -> AppResult<Task> {
    state
        .tasks
        .transition(&task.id, TaskState::Working, None, |_| {});

    let outcome = state.executors.run(&request).await;

    if let Some(current) = state.tasks.get(&task.id) {
        if current.status.state == TaskState::Canceled {
            return Ok(current);
        }
    }

    let updated = match outcome {
        Ok(output) => {
            let part = output.into_part(&format!("{}-{}", request.skill_id(), task.id));
            let reply = Message::agent(vec![part], None);
            state
                .tasks
                .transition(&task.id, TaskState::Completed, Some(reply), |_| {})
        }
        Err(e) => {
            warn!(task_id = %task.id, error = %e, "Free executor failed");
            let reply = Message::agent(
                vec![Part::Text {
                    text: format!("Execution failed: {e}"),
                }],
                None,
            );
            state
                .tasks
                .transition(&task.id, TaskState::Failed, Some(reply), |_| {})
        }
    };
    updated.ok_or_else(|| AppError::TaskNotFound(task.id))
}
