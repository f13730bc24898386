//! Bridges between `trimcal_config` types and `trimcal_core` types.

use crate::calibration::BoardResult;
use crate::config::CalibCfg;
use crate::stats::{HealthCutoffs, to_mv};
use crate::types::BoardKind;
use trimcal_config::ChannelRow;

// ── BoardKind ────────────────────────────────────────────────────────────────

impl From<trimcal_config::BoardKind> for BoardKind {
    fn from(k: trimcal_config::BoardKind) -> Self {
        match k {
            trimcal_config::BoardKind::Direct => Self::Direct,
            trimcal_config::BoardKind::Divided => Self::Divided,
        }
    }
}

// ── HealthCutoffs ────────────────────────────────────────────────────────────

impl From<&trimcal_config::Thresholds> for HealthCutoffs {
    fn from(t: &trimcal_config::Thresholds) -> Self {
        Self {
            rms_mv: t.rms_cutoff_mv,
            baseline_mv: t.baseline_cutoff_mv,
        }
    }
}

// ── CalibCfg ─────────────────────────────────────────────────────────────────

impl From<&trimcal_config::Config> for CalibCfg {
    fn from(c: &trimcal_config::Config) -> Self {
        let mut cfg = Self {
            kind: c.board.kind.into(),
            ..Self::default()
        };
        cfg.sampling.n_samples = c.sampling.n_samples;
        cfg.threshold.rms_factor = c.thresholds.rms_factor;
        cfg.quality.cutoffs = HealthCutoffs::from(&c.thresholds);
        cfg
    }
}

// ── ChannelRow ───────────────────────────────────────────────────────────────

/// One CSV row per channel of every calibrated unit.
pub fn channel_rows(board: &BoardResult) -> Vec<ChannelRow> {
    let kind = board.kind;
    board
        .calibrated()
        .flat_map(|u| {
            let s = u.state;
            u.channels.iter().enumerate().map(move |(ch, c)| ChannelRow {
                board: board.address.clone(),
                unit: u.unit,
                channel: ch,
                baseline_mv: to_mv(c.baseline.median, kind),
                baseline_rms_mv: to_mv(c.baseline.rms, kind),
                mid_eff: c.mid_eff,
                slope: c.slope,
                unit_baseline_mv: to_mv(s.baseline.median, kind),
                unit_rms_mv: to_mv(s.baseline.rms, kind),
                unit_mid_median: s.mid_trim_median,
                unit_eff: s.mid_eff,
                dac: s.dac,
                best_trim: c.best_trim,
                trimmed_median: c.trimmed_median,
                trimmed_eff: c.trimmed_eff,
                dac_slope: s.dac_fit.slope,
                dac_intercept: s.dac_fit.intercept,
                masked: u8::from(c.masked),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{AbandonReason, UnitOutcome, UnitResult};
    use crate::types::{CHANNELS_PER_UNIT, ChannelState, UnitState};

    #[test]
    fn config_overrides_land_in_policy() {
        let toml = r#"
[board]
address = "b"
kind = "divided"
[sampling]
n_samples = 20
[thresholds]
rms_factor = 6.0
rms_cutoff_mv = 15.0
"#;
        let c = trimcal_config::load_toml(toml).unwrap();
        let cfg = CalibCfg::from(&c);
        assert_eq!(cfg.kind, BoardKind::Divided);
        assert_eq!(cfg.sampling.n_samples, 20);
        assert!((cfg.threshold.rms_factor - 6.0).abs() < f32::EPSILON);
        assert!((cfg.quality.cutoffs.rms_mv - 15.0).abs() < f32::EPSILON);
        assert!((cfg.quality.cutoffs.baseline_mv - 20.0).abs() < f32::EPSILON);
        // untouched policy keeps its defaults
        assert_eq!(cfg.threshold.dac_max, 1023);
    }

    #[test]
    fn rows_only_for_calibrated_units() {
        let unit = |n, outcome| UnitResult {
            unit: n,
            outcome,
            state: UnitState::default(),
            channels: [ChannelState::default(); CHANNELS_PER_UNIT],
            correction: 0,
        };
        let board = BoardResult {
            address: "b".into(),
            kind: BoardKind::Direct,
            units: vec![
                unit(0, UnitOutcome::Calibrated),
                unit(
                    1,
                    UnitOutcome::Abandoned(AbandonReason::BadBaseline { bad_channels: 40 }),
                ),
            ],
        };
        let rows = channel_rows(&board);
        assert_eq!(rows.len(), CHANNELS_PER_UNIT);
        assert!(rows.iter().all(|r| r.unit == 0));
    }
}
