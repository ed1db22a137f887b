use image::{GrayImage, Luma, Rgb as Pixel, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::morphology;
use tracing::{debug, warn};

use crate::color::Rgb;
use crate::ocr::{BBoxPx, Line, expand_clamped};

/// Margins added around a line's box before it is erased.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EraseParams {
    pub left: u32,
    pub top: u32,
    pub extra_width: u32,
    pub extra_height: u32,
}

impl Default for EraseParams {
    fn default() -> Self {
        Self {
            left: 10,
            top: 10,
            extra_width: 15,
            extra_height: 10,
        }
    }
}

impl EraseParams {
    pub fn region(&self, bbox: &BBoxPx, width: u32, height: u32) -> Option<BBoxPx> {
        expand_clamped(
            bbox,
            self.left,
            self.top,
            self.extra_width,
            self.extra_height,
            width,
            height,
        )
    }
}

/// Erases every line by flat-filling its expanded box with the mean color of
/// the one-pixel ring around that box.
///
/// Fill colors are sampled from `image` and collected in a separate buffer,
/// so a region never samples another region's fill. Where regions overlap,
/// the later line wins.
pub fn reconstruct_background(image: &RgbImage, lines: &[Line], params: &EraseParams) -> RgbImage {
    let (width, height) = image.dimensions();
    let mut fills: Vec<Option<Rgb>> = vec![None; width as usize * height as usize];

    for (idx, line) in lines.iter().enumerate() {
        let Some(region) = params.region(&line.bbox, width, height) else {
            warn!("line {} lies outside the image; nothing to erase", idx);
            continue;
        };
        let Some(color) = context_ring_mean(image, &region) else {
            warn!("line {} erase region {:?} has no surrounding pixels", idx, region);
            continue;
        };
        debug!("line {}: fill {:?} with {:?}", idx, region, color);
        for y in region.y..region.bottom() {
            let row = y as usize * width as usize;
            for x in region.x..region.right() {
                fills[row + x as usize] = Some(color);
            }
        }
    }

    let mut output = image.clone();
    for (pixel, fill) in output.pixels_mut().zip(fills) {
        if let Some(color) = fill {
            *pixel = Pixel(color);
        }
    }
    output
}

/// Mean color of the pixels that a 3x3 dilation adds around `region`,
/// limited to the image. `None` when the region touches every edge.
pub fn context_ring_mean(image: &RgbImage, region: &BBoxPx) -> Option<Rgb> {
    let (width, height) = image.dimensions();
    // the dilation can only reach one pixel past the region
    let x0 = region.x.saturating_sub(1);
    let y0 = region.y.saturating_sub(1);
    let x1 = region.right().saturating_add(1).min(width);
    let y1 = region.bottom().saturating_add(1).min(height);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }

    let mut mask = GrayImage::new(x1 - x0, y1 - y0);
    for y in region.y..region.bottom().min(y1) {
        for x in region.x..region.right().min(x1) {
            mask.put_pixel(x - x0, y - y0, Luma([255]));
        }
    }
    let dilated = morphology::dilate(&mask, Norm::LInf, 1);

    let mut sums = [0u64; 3];
    let mut count = 0u64;
    for (x, y, grown) in dilated.enumerate_pixels() {
        if grown[0] == 0 || mask.get_pixel(x, y)[0] != 0 {
            continue;
        }
        let pixel = image.get_pixel(x0 + x, y0 + y);
        for (sum, channel) in sums.iter_mut().zip(pixel.0) {
            *sum += channel as u64;
        }
        count += 1;
    }
    if count == 0 {
        return None;
    }
    let mean = |sum: u64| (sum as f64 / count as f64).round() as u8;
    Some([mean(sums[0]), mean(sums[1]), mean(sums[2])])
}
