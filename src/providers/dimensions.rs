//! Fixed output sizes per aspect ratio.
//!
//! Every entry holds roughly 1.75 megapixels so flyers look equally sharp in
//! any orientation, and both sides are multiples of 8.

use crate::models::AspectRatio;

pub const TARGET_MEGAPIXELS: f64 = 1.75;

pub fn standard_dimensions(ratio: AspectRatio) -> (u32, u32) {
    match ratio {
        AspectRatio::Square => (1320, 1320),
        AspectRatio::Landscape16x9 => (1760, 992),
        AspectRatio::Portrait9x16 => (992, 1760),
        AspectRatio::Landscape4x3 => (1528, 1144),
        AspectRatio::Portrait3x4 => (1144, 1528),
        AspectRatio::Portrait4x5 => (1184, 1480),
        AspectRatio::Portrait5x7 => (1120, 1568),
        AspectRatio::Landscape3x2 => (1624, 1080),
        AspectRatio::Portrait2x3 => (1080, 1624),
        AspectRatio::Portrait10x16 => (1048, 1672),
        AspectRatio::Landscape16x10 => (1672, 1048),
        AspectRatio::Portrait1x3 => (760, 2288),
        AspectRatio::Landscape3x1 => (2288, 760),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_entry_is_divisible_by_eight() {
        for ratio in AspectRatio::ALL {
            let (w, h) = standard_dimensions(ratio);
            assert_eq!(w % 8, 0, "{} width", ratio);
            assert_eq!(h % 8, 0, "{} height", ratio);
        }
    }

    #[test]
    fn every_entry_hits_the_pixel_budget() {
        for ratio in AspectRatio::ALL {
            let (w, h) = standard_dimensions(ratio);
            let mp = (w * h) as f64 / 1_000_000.0;
            assert!((mp - TARGET_MEGAPIXELS).abs() < 0.02, "{} is {}MP", ratio, mp);
        }
    }

    #[test]
    fn entries_match_their_ratio() {
        for ratio in AspectRatio::ALL {
            let (w, h) = standard_dimensions(ratio);
            let (rw, rh) = ratio.terms();
            let expected = rw as f64 / rh as f64;
            let actual = w as f64 / h as f64;
            assert!((expected - actual).abs() / expected < 0.01, "{}", ratio);
        }
    }
}
