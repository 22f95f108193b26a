/// Data normalization across the two wallet data sources
///
/// Each adapter's native response folds into the common
/// `NormalizedWallet` shape with confidence accounting; two normalized
/// records can be cross-validated and merged into one combined record.

use chrono::Utc;

use crate::datasources::{IndexerActivity, IndexerPosition, PlatformUserData};
use crate::types::{Confidence, NormalizedWallet, WalletDataSource};

const MS_PER_DAY: f64 = 86_400_000.0;

/// Result of cross-source consistency validation
#[derive(Debug, Clone)]
pub struct ConsistencyReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub confidence: f64,
}

fn age_days_from_ms(first_ms: Option<i64>) -> f64 {
    match first_ms {
        Some(first) if first > 0 => {
            ((Utc::now().timestamp_millis() - first) as f64 / MS_PER_DAY).max(0.0)
        }
        _ => 0.0,
    }
}

/// Normalize the platform data API response. Confidence starts at 100
/// and drops for each missing sub-record.
pub fn normalize_platform(address: &str, data: &PlatformUserData) -> NormalizedWallet {
    let mut score = 100.0;
    let mut reasons = Vec::new();
    let mut warnings = Vec::new();

    if data.activity.is_none() {
        score -= 50.0;
        reasons.push("platform activity summary missing".to_string());
    }
    if data.recent_trades.is_empty() {
        score -= 20.0;
        reasons.push("no recent platform trades".to_string());
    }
    if data.positions.is_empty() && data.closed_positions.is_empty() {
        score -= 10.0;
        reasons.push("no platform positions".to_string());
    }

    let trade_count = data
        .activity
        .as_ref()
        .map(|a| a.trade_count)
        .filter(|count| *count > 0)
        .unwrap_or(data.recent_trades.len() as u64);

    let volume_usd = data
        .activity
        .as_ref()
        .map(|a| a.volume_usd)
        .filter(|v| *v > 0.0)
        .unwrap_or_else(|| data.recent_trades.iter().map(|t| t.usd_value()).sum());

    let first_trade_timestamp = data
        .activity
        .as_ref()
        .and_then(|a| a.first_trade_timestamp)
        .or_else(|| {
            data.recent_trades
                .iter()
                .map(|t| t.timestamp * 1000)
                .min()
        });
    let last_trade_timestamp = data
        .activity
        .as_ref()
        .and_then(|a| a.last_trade_timestamp)
        .or_else(|| {
            data.recent_trades
                .iter()
                .map(|t| t.timestamp * 1000)
                .max()
        });

    if first_trade_timestamp.is_none() {
        warnings.push("account age unknown, assuming new wallet".to_string());
    }

    let markets_traded = data
        .activity
        .as_ref()
        .map(|a| a.markets_traded)
        .filter(|count| *count > 0)
        .unwrap_or_else(|| {
            let mut markets: Vec<&str> = data
                .recent_trades
                .iter()
                .map(|t| t.condition_id.as_str())
                .chain(data.positions.iter().map(|p| p.condition_id.as_str()))
                .chain(data.closed_positions.iter().map(|p| p.condition_id.as_str()))
                .collect();
            markets.sort_unstable();
            markets.dedup();
            markets.len() as u64
        });

    NormalizedWallet {
        address: address.to_string(),
        trade_count,
        volume_usd,
        account_age_days: age_days_from_ms(first_trade_timestamp),
        first_trade_timestamp,
        last_trade_timestamp,
        win_rate: data.activity.as_ref().and_then(|a| a.win_rate),
        pnl: data.activity.as_ref().and_then(|a| a.pnl),
        markets_traded,
        data_source: WalletDataSource::Platform,
        confidence: Confidence::from_score(score, reasons),
        warnings,
    }
}

/// Normalize the subgraph response
pub fn normalize_indexer(
    address: &str,
    activity: Option<&IndexerActivity>,
    positions: Option<&[IndexerPosition]>,
) -> NormalizedWallet {
    let mut score = 100.0;
    let mut reasons = Vec::new();
    let mut warnings = Vec::new();

    if activity.is_none() {
        score -= 50.0;
        reasons.push("subgraph account record missing".to_string());
    }
    if positions.is_none() {
        score -= 20.0;
        reasons.push("subgraph positions unavailable".to_string());
    }

    let first_trade_timestamp = activity
        .and_then(|a| a.creation_timestamp_secs)
        .map(|secs| secs * 1000);
    let last_trade_timestamp = activity
        .and_then(|a| a.last_traded_timestamp_secs)
        .map(|secs| secs * 1000);

    if first_trade_timestamp.is_none() {
        warnings.push("account age unknown, assuming new wallet".to_string());
    }

    NormalizedWallet {
        address: address.to_string(),
        trade_count: activity.map(|a| a.num_trades).unwrap_or(0),
        volume_usd: activity.map(|a| a.collateral_volume_usd).unwrap_or(0.0),
        account_age_days: age_days_from_ms(first_trade_timestamp),
        first_trade_timestamp,
        last_trade_timestamp,
        win_rate: None,
        pnl: None,
        markets_traded: positions.map(|p| p.len() as u64).unwrap_or(0),
        data_source: WalletDataSource::Indexer,
        confidence: Confidence::from_score(score, reasons),
        warnings,
    }
}

/// Compare two normalized records for cross-source agreement.
/// Divergences accumulate warnings and confidence penalties; a
/// zero-vs-nonzero activity split is a major discrepancy.
pub fn validate_consistency(a: &NormalizedWallet, b: &NormalizedWallet) -> ConsistencyReport {
    let mut confidence: f64 = 100.0;
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let trade_mean = (a.trade_count as f64 + b.trade_count as f64) / 2.0;
    if trade_mean > 0.0 {
        let divergence = (a.trade_count as f64 - b.trade_count as f64).abs() / trade_mean;
        if divergence > 0.10 {
            warnings.push(format!(
                "trade count divergence {:.0}% ({} vs {})",
                divergence * 100.0,
                a.trade_count,
                b.trade_count
            ));
            confidence -= 10.0;
        }
    }

    let volume_mean = (a.volume_usd + b.volume_usd) / 2.0;
    if volume_mean > 100.0 {
        let divergence = (a.volume_usd - b.volume_usd).abs() / volume_mean;
        if divergence > 0.15 {
            warnings.push(format!(
                "volume divergence {:.0}% (${:.0} vs ${:.0})",
                divergence * 100.0,
                a.volume_usd,
                b.volume_usd
            ));
            confidence -= 15.0;
        }
    }

    if (a.account_age_days - b.account_age_days).abs() > 1.0 {
        warnings.push(format!(
            "account age divergence ({:.1}d vs {:.1}d)",
            a.account_age_days, b.account_age_days
        ));
        confidence -= 5.0;
    }

    let a_active = a.trade_count > 0;
    let b_active = b.trade_count > 0;
    if a_active != b_active {
        errors.push(format!(
            "major discrepancy: one source reports zero activity ({} vs {} trades)",
            a.trade_count, b.trade_count
        ));
        confidence -= 50.0;
    }

    ConsistencyReport {
        is_valid: errors.is_empty(),
        errors,
        warnings,
        confidence: confidence.max(0.0),
    }
}

/// Merge up to two normalized records into one. With both present the
/// platform record is primary and numeric fields take the max of the
/// two: divergence is a data issue, not a reason to underreport.
pub fn merge(
    platform: Option<NormalizedWallet>,
    indexer: Option<NormalizedWallet>,
) -> Option<NormalizedWallet> {
    match (platform, indexer) {
        (None, None) => None,
        (Some(single), None) | (None, Some(single)) => Some(single),
        (Some(platform), Some(indexer)) => {
            let report = validate_consistency(&platform, &indexer);

            let mut warnings = platform.warnings.clone();
            warnings.extend(indexer.warnings.iter().cloned());
            warnings.extend(report.warnings.iter().cloned());
            warnings.extend(report.errors.iter().cloned());

            let mut reasons = report.errors.clone();
            reasons.extend(report.warnings.clone());

            Some(NormalizedWallet {
                address: platform.address.clone(),
                trade_count: platform.trade_count.max(indexer.trade_count),
                volume_usd: platform.volume_usd.max(indexer.volume_usd),
                account_age_days: if platform.first_trade_timestamp.is_some() {
                    platform.account_age_days
                } else {
                    indexer.account_age_days
                },
                first_trade_timestamp: match (
                    platform.first_trade_timestamp,
                    indexer.first_trade_timestamp,
                ) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (a, b) => a.or(b),
                },
                last_trade_timestamp: match (
                    platform.last_trade_timestamp,
                    indexer.last_trade_timestamp,
                ) {
                    (Some(a), Some(b)) => Some(a.max(b)),
                    (a, b) => a.or(b),
                },
                win_rate: platform.win_rate,
                pnl: platform.pnl,
                markets_traded: platform.markets_traded.max(indexer.markets_traded),
                data_source: WalletDataSource::Combined,
                confidence: Confidence::from_score(report.confidence, reasons),
                warnings,
            })
        }
    }
}

/// Share of the wallet's total exposure sitting in its largest
/// position, as a percentage
pub fn max_position_share_pct(position_values: &[f64]) -> Option<f64> {
    let total: f64 = position_values.iter().filter(|v| **v > 0.0).sum();
    if total <= 0.0 {
        return None;
    }
    position_values
        .iter()
        .cloned()
        .fold(None, |acc: Option<f64>, v| {
            Some(acc.map_or(v, |a| a.max(v)))
        })
        .map(|max| max / total * 100.0)
}
