/// Weighted alert scoring (v2 model)
///
/// Combines the wallet fingerprint and the trade signal into a 0-100
/// score: 60% wallet evidence, 40% market impact. The retired
/// extremity factor stays in the breakdown as 0 for compatibility.

use tracing::debug;

use crate::types::{AlertScore, Classification, ScoreBreakdown, TradeSignal, WalletFingerprint};

const WALLET_WEIGHT: f64 = 0.60;
const IMPACT_WEIGHT: f64 = 0.40;

// Per-flag points, capped at 100 in total
const POINTS_CEX_FUNDED: f64 = 25.0;
const POINTS_LOW_TRADE_COUNT: f64 = 20.0;
const POINTS_YOUNG_ACCOUNT: f64 = 15.0;
const POINTS_HIGH_CONCENTRATION: f64 = 15.0;
const POINTS_FRESH_FAT_BET: f64 = 25.0;
const POINTS_LOW_VOLUME: f64 = 10.0;
const POINTS_HIGH_NETFLOW: f64 = 10.0;
const POINTS_SINGLE_PURPOSE: f64 = 5.0;
const POINTS_SUSPICIOUS_BONUS: f64 = 15.0;

pub struct AlertScorer;

impl AlertScorer {
    pub fn new() -> Self {
        Self
    }

    pub fn score(&self, fingerprint: &WalletFingerprint, signal: &TradeSignal) -> AlertScore {
        let wallet_score = wallet_factor(fingerprint);
        let impact_score = impact_factor(signal.oi_percentage, signal.price_impact);

        let wallet_contribution = WALLET_WEIGHT * wallet_score;
        let impact_contribution = IMPACT_WEIGHT * impact_score;
        let total_score = (wallet_contribution + impact_contribution).round();

        let score = AlertScore {
            total_score,
            breakdown: ScoreBreakdown {
                wallet_contribution,
                impact_contribution,
                extremity_contribution: 0.0,
            },
            classification: Classification::for_score(total_score),
        };

        debug!(
            wallet = %fingerprint.address,
            total = total_score,
            wallet_factor = wallet_score,
            impact_factor = impact_score,
            classification = score.classification.as_str(),
            "trade scored"
        );
        score
    }
}

impl Default for AlertScorer {
    fn default() -> Self {
        Self::new()
    }
}

/// Sum of per-flag points across both flag sets, capped at 100.
/// Paired on-chain/subgraph flags (low tx count / low trade count,
/// young wallet / young account) share one point bucket so a wallet
/// confirmed by both sources is not double-counted.
fn wallet_factor(fingerprint: &WalletFingerprint) -> f64 {
    let onchain = fingerprint.onchain.unwrap_or_default();
    let subgraph = &fingerprint.subgraph;
    let mut points = 0.0;

    if onchain.cex_funded {
        points += POINTS_CEX_FUNDED;
    }
    if onchain.low_tx_count || subgraph.low_trade_count {
        points += POINTS_LOW_TRADE_COUNT;
    }
    if onchain.young_wallet || subgraph.young_account {
        points += POINTS_YOUNG_ACCOUNT;
    }
    if subgraph.high_concentration {
        points += POINTS_HIGH_CONCENTRATION;
    }
    if subgraph.fresh_fat_bet {
        points += POINTS_FRESH_FAT_BET;
    }
    if subgraph.low_volume {
        points += POINTS_LOW_VOLUME;
    }
    if onchain.high_exchange_netflow {
        points += POINTS_HIGH_NETFLOW;
    }
    if onchain.single_purpose {
        points += POINTS_SINGLE_PURPOSE;
    }
    if fingerprint.is_suspicious {
        points += POINTS_SUSPICIOUS_BONUS;
    }

    points.min(100.0)
}

/// min(100, 60·oi%/100 + 40·impact%/100)
fn impact_factor(oi_percentage: f64, price_impact: f64) -> f64 {
    (0.60 * oi_percentage + 0.40 * price_impact).min(100.0)
}
