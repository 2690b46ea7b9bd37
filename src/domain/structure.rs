//! Market-structure analysis: gap zones, order blocks, swing points,
//! break-of-structure detection, zone-proximity scoring, and the
//! structural stop level.
//!
//! Zones are derived fresh on every call over the supplied candle window —
//! nothing here is incrementally maintained. `mitigated` reflects whether
//! price has already traded back into a zone within that window.

use crate::domain::candle::Candle;

pub const DEFAULT_SWING_WINDOW: usize = 5;

/// Native point budgets for zone/structure scoring. The factor scorer
/// rescales these into its own weight allocation.
pub const GAP_MAX_POINTS: f64 = 8.0;
pub const OB_MAX_POINTS: f64 = 7.0;
pub const BOS_POINTS: f64 = 5.0;
pub const CHOCH_POINTS: f64 = 3.0;

const OB_STRENGTH_FLOOR: f64 = 0.3;
const NEAR_PCT: f64 = 0.3;
const APPROACH_PCT: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneKind {
    Bullish,
    Bearish,
}

/// A gap or order-block zone.
#[derive(Debug, Clone, PartialEq)]
pub struct Zone {
    pub kind: ZoneKind,
    pub top: f64,
    pub bottom: f64,
    pub origin: usize,
    pub label: String,
    /// Body ratio of the order-block candle; `None` for gap zones.
    pub strength: Option<f64>,
    pub mitigated: bool,
}

impl Zone {
    pub fn contains(&self, price: f64) -> bool {
        self.bottom <= price && price <= self.top
    }

    fn midpoint(&self) -> f64 {
        (self.top + self.bottom) / 2.0
    }

    /// Distance from the zone midpoint in percent of the midpoint.
    fn distance_pct(&self, price: f64) -> f64 {
        (price - self.midpoint()).abs() / self.midpoint() * 100.0
    }

    /// A later candle trading into the zone mitigates it.
    fn entered_by(&self, candle: &Candle) -> bool {
        candle.low <= self.top && candle.high >= self.bottom
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwingKind {
    High,
    Low,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwingPoint {
    pub index: usize,
    pub kind: SwingKind,
    pub level: f64,
}

/// Break-of-structure / change-of-character readout. `bos` and `choch`
/// are -1, 0, or +1; at most one of them is non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StructureEvent {
    pub bos: i8,
    pub choch: i8,
    pub level: f64,
}

/// Same calendar trading day. Daily candles are session-free: an overnight
/// move between daily bars is not a structural gap candidate filter.
fn same_session(a: &Candle, b: &Candle) -> bool {
    !a.interval.is_intraday() || a.ts.date() == b.ts.date()
}

/// Three-bar gap zones: an up mid-candle with `prev.high < next.low` leaves
/// a bullish zone, a down mid-candle with `prev.low > next.high` a bearish
/// one. Cross-session triples are skipped. Adjacent same-kind zones with
/// consecutive origins merge to the widest extent.
pub fn gap_zones(candles: &[Candle]) -> Vec<Zone> {
    let mut raw: Vec<Zone> = Vec::new();
    if candles.len() < 3 {
        return raw;
    }

    for i in 1..candles.len() - 1 {
        let (prev, mid, next) = (&candles[i - 1], &candles[i], &candles[i + 1]);
        if !(same_session(prev, mid) && same_session(mid, next)) {
            continue;
        }

        if mid.is_bullish() && prev.high < next.low {
            let mut zone = Zone {
                kind: ZoneKind::Bullish,
                top: next.low,
                bottom: prev.high,
                origin: i,
                label: mid.stamp(),
                strength: None,
                mitigated: false,
            };
            zone.mitigated = candles[i + 2..].iter().any(|c| zone.entered_by(c));
            raw.push(zone);
        } else if mid.is_bearish() && prev.low > next.high {
            let mut zone = Zone {
                kind: ZoneKind::Bearish,
                top: prev.low,
                bottom: next.high,
                origin: i,
                label: mid.stamp(),
                strength: None,
                mitigated: false,
            };
            zone.mitigated = candles[i + 2..].iter().any(|c| zone.entered_by(c));
            raw.push(zone);
        }
    }

    merge_consecutive(raw)
}

fn merge_consecutive(zones: Vec<Zone>) -> Vec<Zone> {
    let mut merged: Vec<Zone> = Vec::new();
    let mut last_origin = 0usize;
    for zone in zones {
        match merged.last_mut() {
            Some(cur) if cur.kind == zone.kind && zone.origin == last_origin + 1 => {
                cur.top = cur.top.max(zone.top);
                cur.bottom = cur.bottom.min(zone.bottom);
                cur.mitigated = cur.mitigated || zone.mitigated;
                last_origin = zone.origin;
            }
            _ => {
                last_origin = zone.origin;
                merged.push(zone);
            }
        }
    }
    merged
}

/// Swing highs/lows: index `i` is a swing high when its high is the maximum
/// over `[i - window, i + window]`, symmetrically for lows. Consecutive
/// same-kind points collapse to the more extreme one.
pub fn swing_points(candles: &[Candle], window: usize) -> Vec<SwingPoint> {
    let n = candles.len();
    let mut raw: Vec<SwingPoint> = Vec::new();
    if window == 0 || n < 2 * window + 1 {
        return raw;
    }

    for i in window..n - window {
        let span = &candles[i - window..=i + window];
        let max_high = span.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
        if candles[i].high == max_high {
            raw.push(SwingPoint {
                index: i,
                kind: SwingKind::High,
                level: candles[i].high,
            });
            continue;
        }
        let min_low = span.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
        if candles[i].low == min_low {
            raw.push(SwingPoint {
                index: i,
                kind: SwingKind::Low,
                level: candles[i].low,
            });
        }
    }

    let mut cleaned: Vec<SwingPoint> = Vec::new();
    for point in raw {
        match cleaned.last_mut() {
            Some(last) if last.kind == point.kind => {
                let more_extreme = match point.kind {
                    SwingKind::High => point.level >= last.level,
                    SwingKind::Low => point.level <= last.level,
                };
                if more_extreme {
                    *last = point;
                }
            }
            _ => cleaned.push(point),
        }
    }
    cleaned
}

/// Order blocks: for each swing high, the first later close above the swing
/// level is the break; the block is the lowest-low candle in the segment
/// between swing and break (bullish). Mirror construction on swing lows
/// with the highest-high candle (bearish). Each swing is consumed by at
/// most one break.
pub fn order_blocks(candles: &[Candle], window: usize) -> Vec<Zone> {
    let swings = swing_points(candles, window);
    let n = candles.len();
    let mut zones: Vec<Zone> = Vec::new();

    for swing in &swings {
        let start = swing.index;
        for j in start + 1..n {
            let broke = match swing.kind {
                SwingKind::High => candles[j].close > swing.level,
                SwingKind::Low => candles[j].close < swing.level,
            };
            if !broke {
                continue;
            }

            // segment between swing and break; the bar before the break
            // stands in when they are adjacent
            let seg_start = if j > start + 1 { start + 1 } else { j - 1 };
            let segment = &candles[seg_start..j.max(seg_start + 1)];
            let (offset, block) = match swing.kind {
                SwingKind::High => segment
                    .iter()
                    .enumerate()
                    .min_by(|a, b| a.1.low.total_cmp(&b.1.low)),
                SwingKind::Low => segment
                    .iter()
                    .enumerate()
                    .max_by(|a, b| a.1.high.total_cmp(&b.1.high)),
            }
            .map(|(off, c)| (off, c.clone()))
            .unwrap_or((0, candles[j - 1].clone()));
            let block_index = seg_start + offset;

            if !same_session(&candles[block_index], &candles[j]) {
                break;
            }

            let kind = match swing.kind {
                SwingKind::High => ZoneKind::Bullish,
                SwingKind::Low => ZoneKind::Bearish,
            };
            let mut zone = Zone {
                kind,
                top: block.high,
                bottom: block.low,
                origin: block_index,
                label: block.stamp(),
                strength: Some(block.body_ratio().abs()),
                mitigated: false,
            };
            zone.mitigated = candles[j + 1..].iter().any(|c| zone.entered_by(c));
            zones.push(zone);
            break;
        }
    }

    zones.sort_by_key(|z| z.origin);
    zones
}

/// Trend continuation/reversal from the last 4 swing points.
pub fn structure_break(candles: &[Candle], window: usize) -> StructureEvent {
    let swings = swing_points(candles, window);
    if swings.len() < 4 {
        return StructureEvent::default();
    }

    let last = &swings[swings.len() - 4..];
    let kinds: Vec<SwingKind> = last.iter().map(|s| s.kind).collect();
    let levels: Vec<f64> = last.iter().map(|s| s.level).collect();

    use SwingKind::{High, Low};

    if kinds == [Low, High, Low, High] {
        // rising lows and rising highs continue the uptrend
        if levels[0] < levels[2] && levels[1] < levels[3] {
            return StructureEvent {
                bos: 1,
                choch: 0,
                level: levels[2],
            };
        }
        // higher lows but a failed high warn of a downside turn
        if levels[2] > levels[0] && levels[3] < levels[1] {
            return StructureEvent {
                bos: 0,
                choch: -1,
                level: levels[2],
            };
        }
    }

    if kinds == [High, Low, High, Low] {
        // falling highs and falling lows continue the downtrend
        if levels[0] > levels[2] && levels[1] > levels[3] {
            return StructureEvent {
                bos: -1,
                choch: 0,
                level: levels[2],
            };
        }
        // lower highs but a held low signal an upside turn
        if levels[2] < levels[0] && levels[3] > levels[1] {
            return StructureEvent {
                bos: 0,
                choch: 1,
                level: levels[2],
            };
        }
    }

    StructureEvent::default()
}

fn nearest_active_zone<'a>(zones: &'a [Zone], price: f64) -> Option<&'a Zone> {
    zones
        .iter()
        .filter(|z| !z.mitigated)
        .min_by(|a, b| {
            (price - a.midpoint())
                .abs()
                .total_cmp(&(price - b.midpoint()).abs())
        })
}

/// Gap-zone proximity score in native points (±8 inside, ±5 within 0.3%,
/// ±2 within 1.0%, 0 beyond), signed by zone kind.
pub fn gap_score(candles: &[Candle], price: f64) -> (f64, String) {
    let zones = gap_zones(candles);
    let Some(zone) = nearest_active_zone(&zones, price) else {
        return (0.0, "no gap zone in window".to_string());
    };

    let dist = zone.distance_pct(price);
    let inside = zone.contains(price);
    let points = if inside {
        GAP_MAX_POINTS
    } else if dist < NEAR_PCT {
        5.0
    } else if dist < APPROACH_PCT {
        2.0
    } else {
        0.0
    };

    match zone.kind {
        ZoneKind::Bullish => {
            if inside {
                (points, format!("inside bullish gap {:.1}~{:.1}", zone.bottom, zone.top))
            } else if points > 0.0 {
                (points, format!("near bullish gap ({:.2}% away)", dist))
            } else {
                (0.0, format!("gap zone out of range ({:.1}%)", dist))
            }
        }
        ZoneKind::Bearish => {
            if inside {
                (-points, format!("inside bearish gap {:.1}~{:.1}", zone.bottom, zone.top))
            } else if points > 0.0 {
                (-points, format!("near bearish gap ({:.2}% away)", dist))
            } else {
                (0.0, format!("gap zone out of range ({:.1}%)", dist))
            }
        }
    }
}

/// Order-block proximity score in native points, scaled by the block's
/// body-ratio strength (floored at 0.3).
pub fn order_block_score(candles: &[Candle], price: f64) -> (f64, String) {
    let zones = order_blocks(candles, DEFAULT_SWING_WINDOW);
    let Some(zone) = nearest_active_zone(&zones, price) else {
        return (0.0, "no order block in window".to_string());
    };

    let strength = zone.strength.unwrap_or(0.5);
    let max_points = OB_MAX_POINTS * strength.max(OB_STRENGTH_FLOOR);
    let dist = zone.distance_pct(price);
    let inside = zone.contains(price);

    match zone.kind {
        ZoneKind::Bullish => {
            if inside {
                (
                    max_points,
                    format!(
                        "inside bullish order block {:.1}~{:.1} (strength {:.2})",
                        zone.bottom, zone.top, strength
                    ),
                )
            } else if price > zone.top && dist < NEAR_PCT {
                (
                    max_points * 0.65,
                    format!("just above bullish order block ({:.2}% away)", dist),
                )
            } else if dist < APPROACH_PCT {
                (max_points * 0.3, format!("near bullish order block ({:.2}% away)", dist))
            } else {
                (0.0, format!("order block out of range ({:.1}%)", dist))
            }
        }
        ZoneKind::Bearish => {
            if inside {
                (
                    -max_points,
                    format!(
                        "inside bearish order block {:.1}~{:.1} (strength {:.2})",
                        zone.bottom, zone.top, strength
                    ),
                )
            } else if price < zone.bottom && dist < NEAR_PCT {
                (
                    -max_points * 0.65,
                    format!("just below bearish order block ({:.2}% away)", dist),
                )
            } else if dist < APPROACH_PCT {
                (
                    -max_points * 0.3,
                    format!("near bearish order block ({:.2}% away)", dist),
                )
            } else {
                (0.0, format!("order block out of range ({:.1}%)", dist))
            }
        }
    }
}

/// Structure-break score in native points: BOS ±5, CHoCH ±3.
pub fn structure_score(candles: &[Candle]) -> (f64, String) {
    let event = structure_break(candles, DEFAULT_SWING_WINDOW);

    if event.bos == 1 {
        return (
            BOS_POINTS,
            format!("bullish break of structure (level {:.1})", event.level),
        );
    }
    if event.bos == -1 {
        return (
            -BOS_POINTS,
            format!("bearish break of structure (level {:.1})", event.level),
        );
    }
    if event.choch == 1 {
        return (
            CHOCH_POINTS,
            format!("bullish change of character (level {:.1})", event.level),
        );
    }
    if event.choch == -1 {
        return (
            -CHOCH_POINTS,
            format!("bearish change of character (level {:.1})", event.level),
        );
    }
    (0.0, "structure neutral".to_string())
}

/// Lower boundary of the nearest unmitigated bullish gap zone wholly below
/// price — the structural stop candidate. `None` when no such zone exists;
/// callers fall back to a fixed percentage stop.
pub fn structural_stop(candles: &[Candle], price: f64) -> Option<f64> {
    gap_zones(candles)
        .into_iter()
        .filter(|z| z.kind == ZoneKind::Bullish && !z.mitigated && z.top < price)
        .max_by(|a, b| a.top.total_cmp(&b.top))
        .map(|z| z.bottom)
}
