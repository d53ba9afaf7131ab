//! Output dimension selection per strategy.
//!
//! Pure functions, no decoding involved. Every scale factor here has the form
//! `bound / longest_side`, since `min(b/w, b/h) == b/max(w, h)`, and sides are
//! computed as `floor(side * bound / longest)` so the limiting side lands
//! exactly on the bound instead of one pixel short.

use crate::models::{Dimensions, Strategy};
use image::imageops::FilterType;

/// `quality` allows the limiting side to reach this multiple of the bound.
const QUALITY_HEADROOM: f64 = 1.2;

/// Aspect ratios outside `[EXTREME_ASPECT_LOW, EXTREME_ASPECT_HIGH]` count as extreme.
const EXTREME_ASPECT_HIGH: f64 = 2.0;
const EXTREME_ASPECT_LOW: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Scale {
    bound: f64,
    longest: f64,
}

impl Scale {
    fn fit(source: Dimensions, bound: f64) -> Self {
        Self {
            bound,
            longest: source.width.max(source.height) as f64,
        }
    }

    fn ratio(&self) -> f64 {
        self.bound / self.longest
    }

    fn apply(&self, source: Dimensions) -> Dimensions {
        let side = |v: u32| ((v as f64 * self.bound / self.longest).floor() as u32).max(1);
        Dimensions::new(side(source.width), side(source.height))
    }
}

/// Compute the output dimensions for `source` under `strategy`.
///
/// `balanced` with a normal aspect ratio applies the fit ratio even when it is
/// above 1, so small images are enlarged to the bound.
pub fn target_dimensions(source: Dimensions, strategy: Strategy, max_dimension: u32) -> Dimensions {
    if source.width == 0 || source.height == 0 || max_dimension == 0 {
        return source;
    }

    let bound = max_dimension as f64;
    match strategy {
        Strategy::Speed => {
            if source.width > max_dimension || source.height > max_dimension {
                Scale::fit(source, bound).apply(source)
            } else {
                source
            }
        }
        Strategy::Quality => {
            let scale = Scale::fit(source, bound * QUALITY_HEADROOM);
            if scale.ratio() < 1.0 {
                scale.apply(source)
            } else {
                source
            }
        }
        Strategy::Balanced => {
            let scale = Scale::fit(source, bound);
            if is_extreme_aspect(source) {
                if scale.ratio() < 1.0 {
                    scale.apply(source)
                } else {
                    source
                }
            } else {
                scale.apply(source)
            }
        }
    }
}

pub fn is_extreme_aspect(source: Dimensions) -> bool {
    let aspect = source.width as f64 / source.height as f64;
    aspect > EXTREME_ASPECT_HIGH || aspect < EXTREME_ASPECT_LOW
}

/// Resampling filter used when the dimensions change.
pub fn resample_filter(strategy: Strategy) -> FilterType {
    match strategy {
        Strategy::Speed => FilterType::Nearest,
        Strategy::Balanced => FilterType::Triangle,
        Strategy::Quality => FilterType::Lanczos3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims(width: u32, height: u32) -> Dimensions {
        Dimensions::new(width, height)
    }

    /// floor(side * bound / longest) with integer arithmetic.
    fn expected_fit(source: Dimensions, bound: u64) -> Dimensions {
        let longest = source.width.max(source.height) as u64;
        dims(
            (source.width as u64 * bound / longest) as u32,
            (source.height as u64 * bound / longest) as u32,
        )
    }

    // =========================================================================
    // speed
    // =========================================================================

    #[test]
    fn test_speed_landscape_scenario() {
        // ratio = min(2048/4000, 2048/2000) = 0.512
        assert_eq!(
            target_dimensions(dims(4000, 2000), Strategy::Speed, 2048),
            dims(2048, 1024)
        );
    }

    #[test]
    fn test_speed_keeps_images_within_bound() {
        for source in [dims(1, 1), dims(2048, 2048), dims(640, 480), dims(2048, 10)] {
            assert_eq!(target_dimensions(source, Strategy::Speed, 2048), source);
        }
    }

    #[test]
    fn test_speed_scales_oversized_by_fit_ratio() {
        for source in [dims(4096, 3072), dims(3000, 2049), dims(1000, 5000), dims(2049, 2049)] {
            let out = target_dimensions(source, Strategy::Speed, 2048);
            assert_eq!(out, expected_fit(source, 2048));
            assert_eq!(out.width.max(out.height), 2048);
        }
    }

    #[test]
    fn test_speed_preserves_aspect_within_a_pixel() {
        let source = dims(5000, 3333);
        let out = target_dimensions(source, Strategy::Speed, 1000);
        let expected_height = out.width as f64 * source.height as f64 / source.width as f64;
        assert!((out.height as f64 - expected_height).abs() <= 1.0);
    }

    // =========================================================================
    // quality
    // =========================================================================

    #[test]
    fn test_quality_never_upscales() {
        // ratio = 2457.6 / 1000 > 1
        assert_eq!(
            target_dimensions(dims(1000, 1000), Strategy::Quality, 2048),
            dims(1000, 1000)
        );
    }

    #[test]
    fn test_quality_allows_headroom_above_bound() {
        // 2400 <= 2457.6, so untouched even though it exceeds 2048
        assert_eq!(
            target_dimensions(dims(2400, 1600), Strategy::Quality, 2048),
            dims(2400, 1600)
        );
    }

    #[test]
    fn test_quality_limits_to_headroom_bound() {
        let out = target_dimensions(dims(6000, 4000), Strategy::Quality, 2048);
        // 6000 * 2457.6 / 6000 and 4000 * 2457.6 / 6000
        assert_eq!(out, dims(2457, 1638));
        assert!(out.width as f64 <= 1.2 * 2048.0);
    }

    // =========================================================================
    // balanced
    // =========================================================================

    #[test]
    fn test_balanced_extreme_aspect_scenario() {
        // aspect 6, ratio = min(2048/3000, 2048/500) = 0.6827
        assert_eq!(
            target_dimensions(dims(3000, 500), Strategy::Balanced, 2048),
            dims(2048, 341)
        );
    }

    #[test]
    fn test_balanced_extreme_aspect_never_upscales() {
        assert_eq!(
            target_dimensions(dims(300, 50), Strategy::Balanced, 2048),
            dims(300, 50)
        );
        assert_eq!(
            target_dimensions(dims(50, 300), Strategy::Balanced, 2048),
            dims(50, 300)
        );
    }

    #[test]
    fn test_balanced_normal_aspect_applies_fit_ratio() {
        for source in [dims(4000, 3000), dims(3000, 4000), dims(4000, 2000), dims(2500, 2500)] {
            assert_eq!(
                target_dimensions(source, Strategy::Balanced, 2048),
                expected_fit(source, 2048)
            );
        }
    }

    #[test]
    fn test_balanced_normal_aspect_enlarges_small_images() {
        assert_eq!(
            target_dimensions(dims(100, 80), Strategy::Balanced, 200),
            dims(200, 160)
        );
    }

    #[test]
    fn test_aspect_boundaries_are_normal() {
        assert!(!is_extreme_aspect(dims(200, 100)));
        assert!(!is_extreme_aspect(dims(100, 200)));
        assert!(is_extreme_aspect(dims(201, 100)));
        assert!(is_extreme_aspect(dims(100, 201)));
    }

    #[test]
    fn test_degenerate_sides_clamp_to_one_pixel() {
        assert_eq!(
            target_dimensions(dims(100_000, 10), Strategy::Speed, 100),
            dims(100, 1)
        );
    }

    #[test]
    fn test_filters_follow_strategy() {
        assert_eq!(resample_filter(Strategy::Speed), FilterType::Nearest);
        assert_eq!(resample_filter(Strategy::Balanced), FilterType::Triangle);
        assert_eq!(resample_filter(Strategy::Quality), FilterType::Lanczos3);
    }
}
