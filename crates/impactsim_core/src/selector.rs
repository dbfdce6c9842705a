//! Market-share weighted provider selection
//!
//! Each provider sheet lists alternative upstream processes with the amount
//! they produce. A Monte Carlo pick chooses one of them with probability
//! proportional to its amount, after dropping skipped rows, rows without an
//! amount, and rows outside the optional region allow-list.

use rand::Rng;
use rand::distr::Distribution as _;
use rand::distr::weighted::WeightedIndex;

use crate::error::InputDataError;
use crate::model::ProviderCandidate;

/// Allowed deviation of the share sum from 1 before warning
const SHARE_SUM_TOLERANCE: f64 = 0.04;

fn is_selectable(candidate: &ProviderCandidate, regions: Option<&[String]>) -> bool {
    if candidate.skip {
        return false;
    }
    let Some(amount) = candidate.amount else {
        return false;
    };
    if !amount.is_finite() || amount < 0.0 {
        return false;
    }
    match regions {
        Some(allowed) => candidate
            .region
            .as_ref()
            .is_some_and(|r| allowed.iter().any(|a| a == r)),
        None => true,
    }
}

/// Market shares of the selectable candidates of one sheet.
///
/// Shares are `amount / Σamount` over the filtered set, in table order.
pub fn provider_shares<'a>(
    sheet: &str,
    candidates: &'a [ProviderCandidate],
    regions: Option<&[String]>,
) -> Result<Vec<(&'a ProviderCandidate, f64)>, InputDataError> {
    let selectable: Vec<&ProviderCandidate> = candidates
        .iter()
        .filter(|c| is_selectable(c, regions))
        .collect();

    if selectable.is_empty() {
        return Err(InputDataError::EmptyCandidateSet {
            sheet: sheet.to_string(),
        });
    }

    let total: f64 = selectable.iter().filter_map(|c| c.amount).sum();
    if total <= 0.0 {
        return Err(InputDataError::Schema {
            table: sheet.to_string(),
            reason: "provider amounts sum to zero".to_string(),
        });
    }

    let shares: Vec<(&ProviderCandidate, f64)> = selectable
        .into_iter()
        .map(|c| (c, c.amount.unwrap_or(0.0) / total))
        .collect();

    let sum: f64 = shares.iter().map(|(_, s)| s).sum();
    if !((1.0 - SHARE_SUM_TOLERANCE) < sum && sum < (1.0 + SHARE_SUM_TOLERANCE)) {
        tracing::warn!(
            sheet,
            sum,
            "Market share sum check failed; check provider amounts"
        );
    }

    Ok(shares)
}

/// Pick one provider from a sheet, weighted by market share
pub fn select_provider<'a, R: Rng + ?Sized>(
    sheet: &str,
    candidates: &'a [ProviderCandidate],
    regions: Option<&[String]>,
    rng: &mut R,
) -> Result<&'a ProviderCandidate, InputDataError> {
    let shares = provider_shares(sheet, candidates, regions)?;
    let index = WeightedIndex::new(shares.iter().map(|(_, s)| *s)).map_err(|e| {
        InputDataError::Schema {
            table: sheet.to_string(),
            reason: format!("invalid market shares: {e}"),
        }
    })?;
    let (picked, share) = shares[index.sample(rng)];
    tracing::debug!(sheet, provider = %picked.name, share, "Picked provider");
    Ok(picked)
}
