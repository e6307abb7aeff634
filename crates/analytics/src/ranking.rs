use analysis_core::EnrichedRecord;

/// Relative-strength ranks for a list of one-year returns.
///
/// Only present values take part: they are ordered ascending and position
/// `p` of `n` gets `round((p + 1) / n * 98) + 1`, so the weakest lands near 1
/// and the strongest at 99. Absent inputs get no rank and do not take a slot.
pub fn rs_ranks(returns: &[Option<f64>]) -> Vec<Option<u8>> {
    let mut ranked: Vec<(usize, f64)> = returns
        .iter()
        .enumerate()
        .filter_map(|(i, r)| r.filter(|v| v.is_finite()).map(|v| (i, v)))
        .collect();
    // Stable, so equal returns keep input order
    ranked.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

    let count = ranked.len();
    let mut ranks = vec![None; returns.len()];
    for (position, (idx, _)) in ranked.into_iter().enumerate() {
        let rank = ((position + 1) as f64 / count as f64 * 98.0).round() as u8 + 1;
        ranks[idx] = Some(rank);
    }
    ranks
}

/// Set `rs_rank` on every record from its one-year return.
pub fn assign_rs_ranks(records: &mut [EnrichedRecord]) {
    let returns: Vec<Option<f64>> = records.iter().map(|r| r.one_year_return).collect();
    for (record, rank) in records.iter_mut().zip(rs_ranks(&returns)) {
        record.rs_rank = rank;
    }
}
