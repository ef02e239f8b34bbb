use std::collections::BTreeMap;

use parley_core::{
    ErrorAggregator, ErrorKind, ErrorRecord, GameEngine, GameHistory, Order, PossibleOrders, Power,
};

use crate::agent::PowerAgent;
use crate::negotiation::{scheduled_turns, NegotiationError, NegotiationSettings};
use crate::pool::{TaskResult, WorkerPool};
use crate::validator::fallback_orders;

const RESPONSE_SNIPPET_CHARS: usize = 200;

/// Order phase: asks every active power for orders concurrently and submits
/// each complete set to the engine as its task finishes.
///
/// Decoding failures are recorded as `order_decoding_error`s and the power
/// still submits its fallback set, unless early exit is configured.
pub async fn collect_orders<G>(
    game: &mut G,
    agents: &BTreeMap<Power, PowerAgent>,
    history: &mut GameHistory,
    stats: &mut ErrorAggregator,
    settings: NegotiationSettings,
) -> Result<BTreeMap<Power, Vec<Order>>, NegotiationError>
where
    G: GameEngine + ?Sized,
{
    let phase = game.current_phase();
    history.add_phase(&phase);

    let turns = scheduled_turns(game, agents, history, settings.history_phases);
    let mut possible: BTreeMap<Power, PossibleOrders> = BTreeMap::new();
    let mut jobs = Vec::with_capacity(turns.len());
    for (ctx, client) in turns {
        possible.insert(ctx.power.clone(), ctx.possible_orders.clone());
        jobs.push((ctx.power.clone(), async move { client.get_orders(&ctx).await }));
    }

    let pool = WorkerPool::new(settings.max_concurrency);
    let mut dispatch = pool.dispatch(jobs);
    let mut submitted = BTreeMap::new();
    let mut fatal = None;

    while let Some(TaskResult { power, outcome }) = dispatch.next().await {
        if fatal.is_some() {
            continue;
        }

        let (orders, failure) = match outcome {
            Ok(decision) => {
                let reason = match &decision.decoding_error {
                    Some(error) => Some(error.to_string()),
                    None if decision.used_fallback() => {
                        Some("no legal order in model output".to_string())
                    }
                    None => None,
                };
                let failure = reason.map(|message| {
                    ErrorRecord::new(power.clone(), &phase, 0, ErrorKind::OrderDecoding, message)
                        .with_raw_response(decision.raw_response.clone())
                });
                (decision.orders, failure)
            }
            Err(task_failure) => {
                let orders = possible.get(&power).map(fallback_orders).unwrap_or_default();
                let message = task_failure.to_string();
                (orders, Some(ErrorRecord::new(power.clone(), &phase, 0, ErrorKind::Processing, message)))
            }
        };

        if let Some(record) = failure {
            tracing::warn!(
                event_name = "orders.decision.failed",
                power = %power,
                phase = %phase,
                kind = %record.kind,
                error = %record.message,
                response = %record.response_snippet(RESPONSE_SNIPPET_CHARS).unwrap_or_default(),
                "falling back to default orders"
            );
            if settings.early_exit {
                fatal = Some(NegotiationError::EarlyExit {
                    power: power.clone(),
                    phase: phase.clone(),
                    round: record.round,
                    kind: record.kind,
                    message: record.message.clone(),
                });
            }
            stats.record(record);
            if fatal.is_some() {
                continue;
            }
        }

        if orders.is_empty() {
            tracing::debug!(event_name = "orders.submit.skipped", power = %power, "no orders to submit");
            continue;
        }
        match game.set_orders(&power, &orders) {
            Ok(()) => {
                history.add_orders(&phase, &power, &orders);
                tracing::info!(
                    event_name = "orders.submitted",
                    power = %power,
                    phase = %phase,
                    count = orders.len(),
                    "orders submitted"
                );
                submitted.insert(power, orders);
            }
            Err(error) => {
                tracing::error!(
                    event_name = "orders.submit.rejected",
                    power = %power,
                    phase = %phase,
                    error = %error,
                    "engine rejected orders"
                );
                stats.record(ErrorRecord::new(power, &phase, 0, ErrorKind::Processing, error.to_string()));
            }
        }
    }

    match fatal {
        Some(error) => Err(error),
        None => Ok(submitted),
    }
}
