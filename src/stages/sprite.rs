//! Sprite sheet generation.
//!
//! Stacks the input PNGs top to bottom into one image and writes a stylesheet
//! with one class per tile:
//!
//! ```css
//! .icon-home {
//!   background-image: url(../img/sprite.png);
//!   background-position: 0px -24px;
//!   width: 16px;
//!   height: 16px;
//! }
//! ```
//!
//! Both outputs go into the source tree so the regular copy stages pick them
//! up. With no inputs nothing is written.

use crate::config::SpritesConfig;
use crate::selector::SelectedFile;
use crate::stage::StageError;
use image::{ImageFormat, RgbaImage, imageops};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile {
    pub name: String,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpriteSheet {
    pub width: u32,
    pub height: u32,
    pub tiles: Vec<Tile>,
}

/// Place tiles top-down, `padding` pixels apart.
pub fn layout_tiles(sizes: &[(String, u32, u32)], padding: u32) -> SpriteSheet {
    let mut tiles = Vec::with_capacity(sizes.len());
    let mut y = 0;
    let mut width = 0;
    for (i, (name, w, h)) in sizes.iter().enumerate() {
        if i > 0 {
            y += padding;
        }
        tiles.push(Tile {
            name: name.clone(),
            x: 0,
            y,
            width: *w,
            height: *h,
        });
        y += h;
        width = width.max(*w);
    }
    SpriteSheet {
        width,
        height: y,
        tiles,
    }
}

fn offset(px: u32) -> String {
    if px == 0 {
        "0px".to_string()
    } else {
        format!("-{px}px")
    }
}

pub fn render_css(sheet: &SpriteSheet, config: &SpritesConfig) -> String {
    let mut css = String::new();
    for tile in &sheet.tiles {
        css.push_str(&format!(
            ".{}{} {{\n  background-image: url({});\n  background-position: {} {};\n",
            config.class_prefix,
            tile.name,
            config.image_path,
            offset(tile.x),
            offset(tile.y)
        ));
        css.push_str(&format!(
            "  width: {}px;\n  height: {}px;\n}}\n",
            tile.width, tile.height
        ));
    }
    css
}

/// Composite `files` into `<img_dir>/<image_name>` and write
/// `<css_dir>/<style_name>`.
pub fn build_sprite(
    files: &[SelectedFile],
    img_dir: &Path,
    css_dir: &Path,
    config: &SpritesConfig,
) -> Result<Option<SpriteSheet>, StageError> {
    if files.is_empty() {
        return Ok(None);
    }

    let mut images = Vec::with_capacity(files.len());
    for file in files {
        let img = image::open(&file.path)
            .map_err(|source| StageError::Image {
                path: file.path.clone(),
                source,
            })?
            .to_rgba8();
        let name = Path::new(&file.relative)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        images.push((name, img));
    }

    let sizes: Vec<_> = images
        .iter()
        .map(|(name, img)| (name.clone(), img.width(), img.height()))
        .collect();
    let sheet = layout_tiles(&sizes, config.padding);

    let mut canvas = RgbaImage::new(sheet.width, sheet.height);
    for ((_, img), tile) in images.iter().zip(&sheet.tiles) {
        imageops::overlay(&mut canvas, img, i64::from(tile.x), i64::from(tile.y));
    }

    fs::create_dir_all(img_dir)?;
    let image_path = img_dir.join(&config.image_name);
    canvas
        .save_with_format(&image_path, ImageFormat::Png)
        .map_err(|source| StageError::Image {
            path: image_path.clone(),
            source,
        })?;

    fs::create_dir_all(css_dir)?;
    fs::write(css_dir.join(&config.style_name), render_css(&sheet, config))?;
    tracing::debug!(
        tiles = sheet.tiles.len(),
        width = sheet.width,
        height = sheet.height,
        "sprite written"
    );
    Ok(Some(sheet))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::Selector;
    use image::Rgba;
    use tempfile::TempDir;

    #[test]
    fn tiles_stack_with_padding() {
        let sheet = layout_tiles(&[("a".into(), 8, 8), ("b".into(), 4, 6)], 2);
        assert_eq!(sheet.width, 8);
        assert_eq!(sheet.height, 16);
        assert_eq!(sheet.tiles[1].y, 10);
    }

    #[test]
    fn css_uses_negative_offsets() {
        let sheet = layout_tiles(&[("a".into(), 8, 8), ("b".into(), 4, 6)], 0);
        let css = render_css(&sheet, &SpritesConfig::default());
        assert!(css.contains(
            ".icon-a {\n  background-image: url(../img/sprite.png);\n  background-position: 0px 0px;\n  width: 8px;\n  height: 8px;\n}\n"
        ));
        assert!(css.contains("background-position: 0px -8px;"));
    }

    #[test]
    fn writes_sheet_and_stylesheet() {
        let tmp = TempDir::new().unwrap();
        let sprites = tmp.path().join("img/sprite-img");
        fs::create_dir_all(&sprites).unwrap();
        RgbaImage::from_pixel(8, 8, Rgba([255, 0, 0, 255]))
            .save(sprites.join("a.png"))
            .unwrap();
        RgbaImage::from_pixel(4, 6, Rgba([0, 0, 255, 255]))
            .save(sprites.join("b.png"))
            .unwrap();

        let files = Selector::new(&sprites, &["*.png"]).unwrap().select().unwrap();
        let config = SpritesConfig::default();
        let sheet = build_sprite(
            &files,
            &tmp.path().join("img"),
            &tmp.path().join("css"),
            &config,
        )
        .unwrap()
        .unwrap();
        assert_eq!((sheet.width, sheet.height), (8, 14));

        let out = image::open(tmp.path().join("img/sprite.png")).unwrap().to_rgba8();
        assert_eq!(out.dimensions(), (8, 14));
        assert_eq!(out.get_pixel(0, 0), &Rgba([255, 0, 0, 255]));
        assert_eq!(out.get_pixel(0, 8), &Rgba([0, 0, 255, 255]));
        assert_eq!(out.get_pixel(7, 13)[3], 0);

        let css = fs::read_to_string(tmp.path().join("css/sprite.css")).unwrap();
        assert!(css.contains(".icon-b"));
    }

    #[test]
    fn no_inputs_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let result = build_sprite(
            &[],
            &tmp.path().join("img"),
            &tmp.path().join("css"),
            &SpritesConfig::default(),
        )
        .unwrap();
        assert!(result.is_none());
        assert!(!tmp.path().join("img").exists());
    }
}
