// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Credential geometry, derived entirely from the template's dimensions.
//!
//! Every position and size is a percentage of the template canvas, so the
//! same layout logic tolerates template resolution changes: ship a 2x
//! template and every region, baseline, and font size scales with it.

/// Square region the participant photo (or placeholder) occupies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhotoRegion {
    pub x: u32,
    pub y: u32,
    pub side: u32,
    /// Rounded-mask corner radius in pixels.
    pub corner_radius: f32,
}

/// One text field: a baseline with a bounded shrink-to-fit size range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextLine {
    pub baseline: f32,
    pub max_width: f32,
    pub size: f32,
    pub min_size: f32,
}

/// Placement of the scannable verification code.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QrRegion {
    pub x: u32,
    pub y: u32,
    pub side: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Layout {
    pub width: u32,
    pub height: u32,
    pub center_x: f32,
    pub photo: PhotoRegion,
    pub name: TextLine,
    pub organization: TextLine,
    pub events: TextLine,
    pub code: TextLine,
    pub qr: QrRegion,
}

// Region and baseline percentages. Text sizes shrink to half before the
// renderer falls back to ellipsis truncation.
const PHOTO_SIDE_PCT: f32 = 0.34;
const PHOTO_TOP_PCT: f32 = 0.16;
const PHOTO_CORNER_PCT: f32 = 0.12;
const TEXT_WIDTH_PCT: f32 = 0.84;
const NAME_BASELINE_PCT: f32 = 0.620;
const ORG_BASELINE_PCT: f32 = 0.685;
const EVENTS_BASELINE_PCT: f32 = 0.750;
const CODE_BASELINE_PCT: f32 = 0.815;
const NAME_SIZE_PCT: f32 = 0.052;
const ORG_SIZE_PCT: f32 = 0.034;
const EVENTS_SIZE_PCT: f32 = 0.030;
const CODE_SIZE_PCT: f32 = 0.036;
const MIN_SIZE_FACTOR: f32 = 0.5;
const QR_SIDE_PCT: f32 = 0.16;
const QR_MARGIN_PCT: f32 = 0.04;

impl Layout {
    pub fn for_canvas(width: u32, height: u32) -> Self {
        let w = width as f32;
        let h = height as f32;

        let photo_side = (w * PHOTO_SIDE_PCT).round() as u32;
        let photo = PhotoRegion {
            x: ((w - photo_side as f32) / 2.0).round() as u32,
            y: (h * PHOTO_TOP_PCT).round() as u32,
            side: photo_side,
            corner_radius: photo_side as f32 * PHOTO_CORNER_PCT,
        };

        let line = |baseline_pct: f32, size_pct: f32| TextLine {
            baseline: h * baseline_pct,
            max_width: w * TEXT_WIDTH_PCT,
            size: h * size_pct,
            min_size: h * size_pct * MIN_SIZE_FACTOR,
        };

        let qr_side = (w * QR_SIDE_PCT).round() as u32;
        let qr_margin = (w * QR_MARGIN_PCT).round() as u32;

        Self {
            width,
            height,
            center_x: w / 2.0,
            photo,
            name: line(NAME_BASELINE_PCT, NAME_SIZE_PCT),
            organization: line(ORG_BASELINE_PCT, ORG_SIZE_PCT),
            events: line(EVENTS_BASELINE_PCT, EVENTS_SIZE_PCT),
            code: line(CODE_BASELINE_PCT, CODE_SIZE_PCT),
            qr: QrRegion {
                x: width.saturating_sub(qr_side + qr_margin),
                y: height.saturating_sub(qr_side + qr_margin),
                side: qr_side,
            },
        }
    }
}

/// Cover-fit plan: resize dimensions plus the centered crop offset that
/// yields a `target`×`target` tile from a `src_w`×`src_h` source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoverFit {
    pub resize_w: u32,
    pub resize_h: u32,
    pub crop_x: u32,
    pub crop_y: u32,
}

/// Scale the source to fully fill a `target` square, cropping the overflow
/// and preserving aspect ratio.
pub fn cover_fit(src_w: u32, src_h: u32, target: u32) -> CoverFit {
    let scale = f64::max(
        target as f64 / src_w as f64,
        target as f64 / src_h as f64,
    );
    let resize_w = ((src_w as f64 * scale).ceil() as u32).max(target);
    let resize_h = ((src_h as f64 * scale).ceil() as u32).max(target);
    CoverFit {
        resize_w,
        resize_h,
        crop_x: (resize_w - target) / 2,
        crop_y: (resize_h - target) / 2,
    }
}

/// Shrink a font size in whole-pixel steps until the measured width fits or
/// the floor is reached. `measure` maps a candidate size to rendered width.
pub fn fit_font_size(measure: impl Fn(f32) -> f32, max_width: f32, start: f32, floor: f32) -> f32 {
    let mut size = start;
    while size > floor && measure(size) > max_width {
        size = (size - 1.0).max(floor);
    }
    size
}

/// Alpha for a pixel of a `side`×`side` tile under a rounded-corner mask,
/// with one pixel of antialiasing at the arc edge.
pub fn rounded_corner_alpha(x: u32, y: u32, side: u32, radius: f32) -> u8 {
    let fx = x as f32 + 0.5;
    let fy = y as f32 + 0.5;
    let s = side as f32;

    // Distance to the nearest corner-circle center; pixels outside the
    // corner squares are fully opaque.
    let cx = if fx < radius {
        radius
    } else if fx > s - radius {
        s - radius
    } else {
        return 255;
    };
    let cy = if fy < radius {
        radius
    } else if fy > s - radius {
        s - radius
    } else {
        return 255;
    };

    let dist = ((fx - cx).powi(2) + (fy - cy).powi(2)).sqrt();
    let coverage = (radius + 0.5 - dist).clamp(0.0, 1.0);
    (coverage * 255.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_scales_with_template_resolution() {
        let small = Layout::for_canvas(600, 960);
        let large = Layout::for_canvas(1200, 1920);

        // Doubling the template doubles every region.
        assert_eq!(large.photo.side, small.photo.side * 2);
        assert_eq!(large.qr.side, small.qr.side * 2);
        assert!((large.name.baseline - small.name.baseline * 2.0).abs() < 1.0);
        assert!((large.name.size - small.name.size * 2.0).abs() < 0.01);
    }

    #[test]
    fn photo_region_is_horizontally_centered() {
        let layout = Layout::for_canvas(600, 960);
        let left = layout.photo.x;
        let right = layout.width - (layout.photo.x + layout.photo.side);
        assert!(left.abs_diff(right) <= 1);
    }

    #[test]
    fn baselines_are_ordered_top_to_bottom() {
        let layout = Layout::for_canvas(600, 960);
        assert!((layout.photo.y + layout.photo.side) as f32 < layout.name.baseline);
        assert!(layout.name.baseline < layout.organization.baseline);
        assert!(layout.organization.baseline < layout.events.baseline);
        assert!(layout.events.baseline < layout.code.baseline);
    }

    #[test]
    fn cover_fit_fills_the_target_exactly() {
        for (w, h) in [(100, 100), (400, 300), (300, 400), (37, 911), (911, 37)] {
            let plan = cover_fit(w, h, 200);
            assert!(plan.resize_w >= 200);
            assert!(plan.resize_h >= 200);
            // One axis matches the target (up to ceil rounding), the other overflows.
            assert!(plan.resize_w == 200 || plan.resize_h >= 200);
            assert!(plan.crop_x + 200 <= plan.resize_w);
            assert!(plan.crop_y + 200 <= plan.resize_h);
            // Crop is centered.
            assert!(plan.crop_x.abs_diff(plan.resize_w - 200 - plan.crop_x) <= 1);
        }
    }

    #[test]
    fn cover_fit_preserves_aspect_ratio() {
        let plan = cover_fit(400, 300, 200);
        let src_ratio = 400.0 / 300.0;
        let out_ratio = plan.resize_w as f64 / plan.resize_h as f64;
        assert!((src_ratio - out_ratio).abs() < 0.02);
    }

    #[test]
    fn fit_font_size_shrinks_until_it_fits() {
        // Width proportional to size: 10px of width per size unit.
        let measure = |size: f32| size * 10.0;
        let fitted = fit_font_size(measure, 300.0, 50.0, 20.0);
        assert!(fitted <= 30.0);
        assert!(measure(fitted) <= 300.0);
    }

    #[test]
    fn fit_font_size_stops_at_the_floor() {
        let measure = |_size: f32| 10_000.0; // never fits
        let fitted = fit_font_size(measure, 300.0, 50.0, 25.0);
        assert_eq!(fitted, 25.0);
    }

    #[test]
    fn fit_font_size_keeps_fitting_text_untouched() {
        let measure = |size: f32| size * 2.0;
        assert_eq!(fit_font_size(measure, 300.0, 48.0, 24.0), 48.0);
    }

    #[test]
    fn rounded_mask_is_opaque_in_the_middle_and_clipped_at_corners() {
        let side = 100;
        let radius = 12.0;
        assert_eq!(rounded_corner_alpha(50, 50, side, radius), 255);
        assert_eq!(rounded_corner_alpha(50, 0, side, radius), 255);
        // The extreme corner pixel sits outside the arc.
        assert_eq!(rounded_corner_alpha(0, 0, side, radius), 0);
        assert_eq!(rounded_corner_alpha(99, 99, side, radius), 0);
    }

    #[test]
    fn rounded_mask_is_symmetric() {
        let side = 100;
        let radius = 12.0;
        for (x, y) in [(0u32, 0u32), (3, 1), (5, 5), (11, 2)] {
            let a = rounded_corner_alpha(x, y, side, radius);
            assert_eq!(a, rounded_corner_alpha(side - 1 - x, y, side, radius));
            assert_eq!(a, rounded_corner_alpha(x, side - 1 - y, side, radius));
            assert_eq!(
                a,
                rounded_corner_alpha(side - 1 - x, side - 1 - y, side, radius)
            );
        }
    }
}
