use crate::ocr::BBoxPx;

pub fn union_bbox(a: &BBoxPx, b: &BBoxPx) -> BBoxPx {
    let x1 = a.x.min(b.x);
    let y1 = a.y.min(b.y);
    let x2 = a.right().max(b.right());
    let y2 = a.bottom().max(b.bottom());
    BBoxPx {
        x: x1,
        y: y1,
        w: x2 - x1,
        h: y2 - y1,
    }
}

/// Moves the top-left corner by `(-left, -top)` (saturating at zero), grows
/// the size by `(extra_w, extra_h)` from the moved corner, and clips the
/// result to a `width` x `height` canvas. Returns `None` when nothing is left.
pub fn expand_clamped(
    bbox: &BBoxPx,
    left: u32,
    top: u32,
    extra_w: u32,
    extra_h: u32,
    width: u32,
    height: u32,
) -> Option<BBoxPx> {
    let x = bbox.x.saturating_sub(left);
    let y = bbox.y.saturating_sub(top);
    if x >= width || y >= height {
        return None;
    }
    let x2 = x.saturating_add(bbox.w.saturating_add(extra_w)).min(width);
    let y2 = y.saturating_add(bbox.h.saturating_add(extra_h)).min(height);
    if x2 <= x || y2 <= y {
        return None;
    }
    Some(BBoxPx {
        x,
        y,
        w: x2 - x,
        h: y2 - y,
    })
}

/// Clips a box to the canvas without expanding it.
pub(crate) fn clamp_to(bbox: &BBoxPx, width: u32, height: u32) -> Option<BBoxPx> {
    expand_clamped(bbox, 0, 0, 0, 0, width, height)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_covers_both_boxes() {
        let a = BBoxPx::new(0, 0, 30, 20);
        let b = BBoxPx::new(35, 1, 20, 20);
        let union = union_bbox(&a, &b);
        assert_eq!(union, BBoxPx::new(0, 0, 55, 21));
        assert!(union.contains(&a));
        assert!(union.contains(&b));
    }

    #[test]
    fn expand_keeps_width_growth_from_clamped_corner() {
        let bbox = BBoxPx::new(4, 30, 50, 20);
        let region = expand_clamped(&bbox, 10, 10, 15, 10, 200, 200).unwrap();
        assert_eq!(region, BBoxPx::new(0, 20, 65, 30));
    }

    #[test]
    fn expand_clips_to_canvas() {
        let bbox = BBoxPx::new(90, 90, 20, 20);
        let region = expand_clamped(&bbox, 10, 10, 15, 10, 100, 100).unwrap();
        assert_eq!(region, BBoxPx::new(80, 80, 20, 20));
    }

    #[test]
    fn expand_outside_canvas_is_none() {
        let bbox = BBoxPx::new(500, 10, 20, 20);
        assert!(expand_clamped(&bbox, 10, 10, 15, 10, 100, 100).is_none());
        assert!(clamp_to(&BBoxPx::new(10, 10, 0, 5), 100, 100).is_none());
    }
}
