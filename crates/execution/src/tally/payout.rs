// Path: crates/execution/src/tally/payout.rs

//! Settlement of a request's gas meter into distributions.

use super::gas_meter::GasMeter;
use tally_types::app::events::{
    ATTRIBUTE_AMOUNT, ATTRIBUTE_DATA_PROXY_GAS, ATTRIBUTE_DATA_REQUEST_HEIGHT,
    ATTRIBUTE_DATA_REQUEST_ID, ATTRIBUTE_EXECUTOR, ATTRIBUTE_EXECUTOR_GAS,
    ATTRIBUTE_REDUCED_PAYOUT, ATTRIBUTE_REDUCED_PAYOUT_BURN, ATTRIBUTE_TALLY_GAS,
    ATTRIBUTE_TIMED_OUT, EVENT_TYPE_EXECUTOR_REWARD_COMMIT, EVENT_TYPE_GAS_METER,
};
use tally_types::app::{Distribution, Event, Request};
use tally_types::config::BurnRatio;

/// Reads a settled gas meter into an ordered list of distributions and the
/// `gas_meter` audit event.
///
/// The list starts with a single burn covering the tally gas, followed by one
/// reward per recorded data proxy payout and one per recorded executor payout.
/// In reduced payout mode `burn_ratio` of every executor payout is moved into
/// the burn.
pub fn distributions_from_gas_meter(
    gas_meter: &GasMeter,
    dr_id: &str,
    dr_height: u64,
    burn_ratio: BurnRatio,
) -> (Vec<Distribution>, Event) {
    let price = gas_meter.gas_price();
    let tally_gas = gas_meter.tally_gas_used();

    let mut event = Event::new(EVENT_TYPE_GAS_METER)
        .with_attribute(ATTRIBUTE_DATA_REQUEST_ID, dr_id)
        .with_attribute(ATTRIBUTE_DATA_REQUEST_HEIGHT, dr_height)
        .with_attribute(ATTRIBUTE_REDUCED_PAYOUT, gas_meter.reduced_payout())
        .with_attribute(ATTRIBUTE_TALLY_GAS, tally_gas);

    let mut dists = Vec::with_capacity(
        1 + gas_meter.proxy_payouts().len() + gas_meter.executor_payouts().len(),
    );
    dists.push(Distribution::burn(u128::from(tally_gas), price));

    for proxy in gas_meter.proxy_payouts() {
        dists.push(Distribution::data_proxy_reward(
            proxy.public_key.as_str(),
            proxy.payout_address.as_str(),
            u128::from(proxy.amount),
            price,
        ));
        event.push_attribute(
            ATTRIBUTE_DATA_PROXY_GAS,
            format!("{},{},{}", proxy.public_key, proxy.payout_address, proxy.amount),
        );
    }

    let mut reduced_payout_burn: u128 = 0;
    for executor in gas_meter.executor_payouts() {
        let mut payout = executor.amount;
        if gas_meter.reduced_payout() {
            let burned = burn_ratio.burn_portion(executor.amount);
            payout = executor.amount - burned;
            reduced_payout_burn = reduced_payout_burn.saturating_add(u128::from(burned));
        }
        dists.push(Distribution::executor_reward(
            executor.identity.as_str(),
            u128::from(payout),
            price,
        ));
        event.push_attribute(
            ATTRIBUTE_EXECUTOR_GAS,
            format!("{},{}", executor.identity, payout),
        );
    }

    if reduced_payout_burn > 0 {
        let total = u128::from(tally_gas).saturating_add(reduced_payout_burn);
        if let Some(burn) = dists.first_mut() {
            *burn = Distribution::burn(total, price);
        }
    }
    event.push_attribute(ATTRIBUTE_REDUCED_PAYOUT_BURN, reduced_payout_burn);

    (dists, event)
}

/// Pays `gas_cost_commit` to every committer of a request that timed out
/// without enough reveals, capped by the remaining execution gas per executor.
///
/// Returns one `executor_reward_commit` event per committer, in sorted order,
/// carrying the amount in tokens.
pub fn calculate_committer_payouts(
    gas_meter: &mut GasMeter,
    req: &Request,
    gas_cost_commit: u64,
) -> Vec<Event> {
    if req.commits.is_empty() {
        return Vec::new();
    }

    let cap = gas_meter
        .remaining_exec_gas()
        .checked_div(u64::from(req.replication_factor))
        .unwrap_or(0);
    let gas_used = gas_cost_commit.min(cap);
    let tokens = u128::from(gas_used).saturating_mul(gas_meter.gas_price());

    req.sorted_committers()
        .into_iter()
        .map(|committer| {
            gas_meter.consume_exec_gas_for_executor(&committer, gas_used);
            Event::new(EVENT_TYPE_EXECUTOR_REWARD_COMMIT)
                .with_attribute(ATTRIBUTE_DATA_REQUEST_ID, &req.id)
                .with_attribute(ATTRIBUTE_EXECUTOR, committer)
                .with_attribute(ATTRIBUTE_AMOUNT, tokens)
                .with_attribute(ATTRIBUTE_TIMED_OUT, true)
        })
        .collect()
}
