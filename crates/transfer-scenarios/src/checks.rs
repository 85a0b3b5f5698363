use crate::stats::ScenarioStats;

/// Borrowed view over delivered bundle/message ids for verification
/// helpers.
pub struct DrainReport<'a> {
    pub bundle_ids: &'a [u64],
    pub message_ids: &'a [u64],
}

pub type CheckResult = Result<(), String>;

fn verify_strictly_increasing(ids: &[u64], label: &str) -> CheckResult {
    for window in ids.windows(2) {
        if window[1] <= window[0] {
            return Err(format!(
                "{label} not strictly increasing: {} then {}",
                window[0], window[1]
            ));
        }
    }
    Ok(())
}

pub fn verify_flood(
    drain: &DrainReport<'_>,
    stats: &ScenarioStats,
    expected_bundles: u32,
) -> CheckResult {
    if drain.bundle_ids.len() as u32 != expected_bundles {
        return Err(format!(
            "delivered {} bundles (expected {expected_bundles})",
            drain.bundle_ids.len()
        ));
    }
    verify_strictly_increasing(drain.bundle_ids, "bundle ids")?;
    verify_strictly_increasing(drain.message_ids, "message ids")?;
    if stats.produced != expected_bundles {
        return Err(format!(
            "stats produced {} bundles (expected {expected_bundles})",
            stats.produced
        ));
    }
    if stats.consumed != expected_bundles {
        return Err(format!(
            "stats consumed {} bundles (expected {expected_bundles})",
            stats.consumed
        ));
    }
    Ok(())
}

pub fn verify_backpressure(
    drain: &DrainReport<'_>,
    stats: &ScenarioStats,
    expected_bundles: u32,
) -> CheckResult {
    verify_flood(drain, stats, expected_bundles)?;
    if stats.full_channel == 0 {
        return Err(
            "backpressure scenario expected at least one rejected push, observed none".into(),
        );
    }
    Ok(())
}

pub fn verify_resume(
    drain: &DrainReport<'_>,
    stats: &ScenarioStats,
    expected_bundles: u32,
    ack_at: u64,
) -> CheckResult {
    verify_strictly_increasing(drain.bundle_ids, "bundle ids")?;
    if stats.produced != expected_bundles {
        return Err(format!(
            "stats produced {} bundles (expected {expected_bundles})",
            stats.produced
        ));
    }
    // Everything above the acknowledgement must arrive; anything at or
    // below it may reappear only as the boundary duplicate.
    let highest = u64::from(expected_bundles);
    for message_id in (ack_at + 1)..=highest {
        if !drain.message_ids.contains(&message_id) {
            return Err(format!(
                "message id {message_id} above the acknowledgement was never delivered"
            ));
        }
    }
    if let Some(&stale) = drain
        .message_ids
        .iter()
        .find(|&&message_id| message_id < ack_at)
    {
        return Err(format!(
            "message id {stale} below the acknowledgement boundary was redelivered"
        ));
    }
    Ok(())
}
