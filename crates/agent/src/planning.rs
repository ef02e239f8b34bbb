use std::collections::BTreeMap;

use parley_core::{GameEngine, GameHistory, Power};

use crate::agent::PowerAgent;
use crate::negotiation::{scheduled_turns, NegotiationSettings};
use crate::pool::{TaskResult, WorkerPool};

/// Asks each active power for a strategic directive and stores the
/// non-empty ones in the history of the current phase.
pub async fn run_planning<G>(
    game: &G,
    agents: &BTreeMap<Power, PowerAgent>,
    history: &mut GameHistory,
    settings: NegotiationSettings,
) -> BTreeMap<Power, String>
where
    G: GameEngine + ?Sized,
{
    let phase = game.current_phase();
    history.add_phase(&phase);

    let jobs = scheduled_turns(game, agents, history, settings.history_phases)
        .into_iter()
        .map(|(ctx, client)| (ctx.power.clone(), async move { client.get_plan(&ctx).await }))
        .collect::<Vec<_>>();

    let mut dispatch = WorkerPool::new(settings.max_concurrency).dispatch(jobs);
    let mut plans = BTreeMap::new();
    while let Some(TaskResult { power, outcome }) = dispatch.next().await {
        match outcome {
            Ok(plan) if !plan.is_empty() => {
                history.add_plan(&phase, &power, plan.clone());
                plans.insert(power, plan);
            }
            Ok(_) => tracing::debug!(
                event_name = "planning.plan.empty",
                power = %power,
                phase = %phase,
                "no plan generated"
            ),
            Err(failure) => tracing::error!(
                event_name = "planning.task.failed",
                power = %power,
                phase = %phase,
                error = %failure,
                "planning task did not complete"
            ),
        }
    }

    tracing::info!(event_name = "planning.finished", phase = %phase, plans = plans.len(), "planning done");
    plans
}
