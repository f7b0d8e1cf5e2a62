use image::{Rgb, RgbImage, imageops::FilterType};
use imageproc::{drawing::draw_filled_rect_mut, rect::Rect};

#[derive(Debug, Clone, Copy)]
pub enum ColorScheme {
    HeatMap,
    Grayscale,
}

#[derive(Debug, Clone)]
pub struct VisualizationConfig {
    pub color_scheme: ColorScheme,
    pub separator_width: u32,
    pub separator_color: Rgb<u8>,
}

impl Default for VisualizationConfig {
    fn default() -> Self {
        Self {
            color_scheme: ColorScheme::HeatMap,
            separator_width: 4,
            separator_color: Rgb([255, 255, 255]),
        }
    }
}

pub struct Visualizer {
    config: VisualizationConfig,
}

impl Visualizer {
    pub fn new() -> Self {
        Self {
            config: VisualizationConfig::default(),
        }
    }

    pub fn with_config(config: VisualizationConfig) -> Self {
        Self { config }
    }

    /// Colours an ELA map by its per-pixel channel mean.
    pub fn create_heatmap(&self, ela_map: &RgbImage) -> RgbImage {
        let (width, height) = ela_map.dimensions();
        let mut heatmap = RgbImage::new(width, height);

        for (x, y, pixel) in ela_map.enumerate_pixels() {
            let mean = (pixel[0] as f32 + pixel[1] as f32 + pixel[2] as f32) / 3.0;
            heatmap.put_pixel(x, y, self.intensity_to_color(mean / 255.0));
        }

        heatmap
    }

    /// Original on the left, ELA map scaled to the same size on the right.
    pub fn side_by_side(&self, original: &RgbImage, ela_map: &RgbImage) -> RgbImage {
        let (width, height) = original.dimensions();
        let ela = if ela_map.dimensions() == (width, height) {
            ela_map.clone()
        } else {
            image::imageops::resize(ela_map, width, height, FilterType::Triangle)
        };

        let gap = self.config.separator_width;
        let mut canvas = RgbImage::new(width * 2 + gap, height);

        image::imageops::replace(&mut canvas, original, 0, 0);
        image::imageops::replace(&mut canvas, &ela, (width + gap) as i64, 0);

        if gap > 0 {
            draw_filled_rect_mut(
                &mut canvas,
                Rect::at(width as i32, 0).of_size(gap, height),
                self.config.separator_color,
            );
        }

        canvas
    }

    fn intensity_to_color(&self, intensity: f32) -> Rgb<u8> {
        let intensity = intensity.clamp(0.0, 1.0);

        match self.config.color_scheme {
            ColorScheme::HeatMap => {
                let (r, g, b) = if intensity < 0.25 {
                    let t = intensity / 0.25;
                    (0.0, t, 1.0)
                } else if intensity < 0.5 {
                    let t = (intensity - 0.25) / 0.25;
                    (0.0, 1.0, 1.0 - t)
                } else if intensity < 0.75 {
                    let t = (intensity - 0.5) / 0.25;
                    (t, 1.0, 0.0)
                } else {
                    let t = (intensity - 0.75) / 0.25;
                    (1.0, 1.0 - t, 0.0)
                };

                Rgb([(r * 255.0) as u8, (g * 255.0) as u8, (b * 255.0) as u8])
            }
            ColorScheme::Grayscale => {
                let v = (intensity * 255.0).round() as u8;
                Rgb([v, v, v])
            }
        }
    }
}

impl Default for Visualizer {
    fn default() -> Self {
        Self::new()
    }
}
