//! The stage catalog.
//!
//! Every stage the build knows about, declared as data. Names are the ones
//! accepted on the command line.
//!
//! | Stage | Reads | Writes |
//! |-------|-------|--------|
//! | `clean` | | removes dist, archive, manifests |
//! | `lint:js` | `src/js/*.js`, `test/*.js` | |
//! | `compile:less` | `src/css/less/*.less` | `src/css/` |
//! | `compile:sass` | `src/css/sass/*.scss` (no partials) | `src/css/` |
//! | `copy:htaccess` | configured server config | `dist/.htaccess` |
//! | `copy:license` | `LICENSE.txt` | `dist/` |
//! | `copy:misc` | `src/**/*` minus img, css, js, html | `dist/` |
//! | `img:sprites` | `src/img/sprite-img/*.png` | `src/img/`, `src/css/` |
//! | `js:copy`, `css:copy`, `img:copy`, `font:copy` | `src/<class>/` | `dist/<class>/` |
//! | `html:copy` | `src/**/*.html` | `dist/` |
//! | `img:imagemin` | `dist/img/*` | in place |
//! | `css:autoprefixer` | `dist/css/**/*.css` | in place |
//! | `font:rev`, `js:rev`, `css:rev` | `dist/<class>/**` | in place + manifest |
//! | `img:rev` | `dist/img/*` | in place + manifest |
//! | `css:rewrite` | `dist/css/**/*.css` | in place |
//! | `html:bundle` | `dist/**/*.html` | in place + bundles |
//! | `html:minify` | `dist/**/*.html` | in place |
//! | `archive:dir` | | `archive/` |
//! | `archive:zip` | `dist/**/*` | `archive/<name>_v<version>.zip` |
//!
//! `font:copy` is not part of any plan: fonts reach the output tree through
//! `copy:misc`. It can still be run on its own.

pub mod bundle;
pub mod compile;
pub mod compress;
pub mod copy;
pub mod lint;
pub mod minify;
pub mod prefix;
pub mod sprite;

use crate::config::{Layout, ProjectConfig};
use crate::selector::{SelectError, SelectedFile, Selector};
use crate::stage::{Artifact, Stage, StageError, Transform};
use crate::types::AssetClass;
use compile::StylesheetLanguage;
use copy::Replacement;
use std::fs;
use std::path::PathBuf;

/// Declare every stage for a project, in catalog order.
pub fn catalog(layout: &Layout, config: &ProjectConfig) -> Result<Vec<Stage>, SelectError> {
    use AssetClass::*;
    use Artifact::*;

    let src = &layout.source;
    let dist = &layout.dist;
    let class_src = |class: AssetClass| src.join(class.dir_name());
    let class_dist = |class: AssetClass| dist.join(class.dir_name());

    let stage = |name: &'static str,
                 inputs: Vec<Selector>,
                 output: PathBuf,
                 transform: Transform,
                 requires: Vec<Artifact>,
                 produces: Vec<Artifact>| Stage {
        name,
        inputs,
        output,
        transform,
        requires,
        produces,
    };
    let plain_copy = || Transform::Copy {
        replacements: Vec::new(),
    };

    Ok(vec![
        stage(
            "clean",
            vec![],
            dist.clone(),
            Transform::Clean {
                targets: vec![dist.clone(), layout.archive.clone(), layout.manifests_dir()],
            },
            vec![],
            vec![CleanOutput],
        ),
        stage(
            "lint:js",
            vec![
                Selector::new(class_src(Scripts), &["*.js"])?,
                Selector::new(&layout.test, &["*.js"])?,
            ],
            layout.root.clone(),
            Transform::Lint,
            vec![],
            vec![],
        ),
        stage(
            "compile:less",
            vec![Selector::new(class_src(Styles).join("less"), &["*.less"])?],
            class_src(Styles),
            Transform::Compile(StylesheetLanguage::Less),
            vec![],
            vec![CompiledLess],
        ),
        stage(
            "compile:sass",
            vec![Selector::new(class_src(Styles).join("sass"), &["*.scss"])?.exclude(&["_*"])?],
            class_src(Styles),
            Transform::Compile(StylesheetLanguage::Scss),
            vec![],
            vec![CompiledSass],
        ),
        stage(
            "copy:htaccess",
            vec![Selector::file(&layout.root.join(&config.copy.htaccess))?],
            dist.clone(),
            Transform::Copy {
                replacements: vec![Replacement::new("# ErrorDocument", "ErrorDocument")],
            },
            vec![CleanOutput],
            vec![ServerConfig],
        ),
        stage(
            "copy:license",
            vec![Selector::file(&layout.root.join(&config.copy.license))?],
            dist.clone(),
            plain_copy(),
            vec![CleanOutput],
            vec![License],
        ),
        stage(
            "copy:misc",
            vec![
                Selector::new(src, &["**/*"])?
                    .exclude(&["img/**/*", "css/**/*", "js/**/*", "**/*.html"])?
                    .with_dot(),
            ],
            dist.clone(),
            plain_copy(),
            vec![CleanOutput],
            vec![MiscFiles],
        ),
        stage(
            "img:sprites",
            vec![Selector::new(class_src(Images).join("sprite-img"), &["*.png"])?],
            class_src(Images),
            Transform::Sprite {
                css_dir: class_src(Styles),
            },
            vec![],
            vec![SpriteSheet],
        ),
        stage(
            "js:copy",
            vec![Selector::new(class_src(Scripts), &["**/*"])?],
            class_dist(Scripts),
            plain_copy(),
            vec![CleanOutput],
            vec![Copied(Scripts)],
        ),
        stage(
            "css:copy",
            vec![Selector::new(class_src(Styles), &["**/*.css"])?],
            class_dist(Styles),
            plain_copy(),
            vec![CleanOutput, CompiledLess, CompiledSass, SpriteSheet],
            vec![Copied(Styles)],
        ),
        stage(
            "html:copy",
            vec![Selector::new(src, &["**/*.html"])?],
            dist.clone(),
            plain_copy(),
            vec![CleanOutput],
            vec![CopiedMarkup],
        ),
        stage(
            "img:copy",
            vec![Selector::new(class_src(Images), &["**/*"])?],
            class_dist(Images),
            plain_copy(),
            vec![CleanOutput, SpriteSheet],
            vec![Copied(Images)],
        ),
        stage(
            "font:copy",
            vec![Selector::new(class_src(Fonts), &["*"])?],
            class_dist(Fonts),
            plain_copy(),
            vec![CleanOutput],
            vec![Copied(Fonts)],
        ),
        stage(
            "img:imagemin",
            vec![Selector::new(
                class_dist(Images),
                &["*.png", "*.jpg", "*.jpeg", "*.gif", "*.svg"],
            )?],
            class_dist(Images),
            Transform::Compress,
            vec![Copied(Images)],
            vec![CompressedImages],
        ),
        stage(
            "css:autoprefixer",
            vec![Selector::new(class_dist(Styles), &["**/*.css"])?],
            class_dist(Styles),
            Transform::Autoprefix,
            vec![Copied(Styles)],
            vec![PrefixedStyles],
        ),
        stage(
            "font:rev",
            vec![Selector::new(class_dist(Fonts), &["**/*"])?],
            class_dist(Fonts),
            Transform::Fingerprint(Fonts),
            vec![MiscFiles],
            vec![Manifest(Fonts)],
        ),
        stage(
            "img:rev",
            vec![Selector::new(class_dist(Images), &["*"])?],
            class_dist(Images),
            Transform::Fingerprint(Images),
            vec![CompressedImages],
            vec![Manifest(Images)],
        ),
        stage(
            "css:rewrite",
            vec![Selector::new(class_dist(Styles), &["**/*.css"])?],
            class_dist(Styles),
            Transform::Rewrite {
                manifests: vec![Fonts, Images],
            },
            vec![PrefixedStyles, Manifest(Fonts), Manifest(Images)],
            vec![RewrittenStyles],
        ),
        stage(
            "html:bundle",
            vec![Selector::new(dist, &["**/*.html"])?],
            dist.clone(),
            Transform::Bundle,
            vec![CopiedMarkup, Copied(Scripts), RewrittenStyles],
            vec![BundledMarkup],
        ),
        stage(
            "js:rev",
            vec![Selector::new(class_dist(Scripts), &["**/*"])?],
            class_dist(Scripts),
            Transform::Fingerprint(Scripts),
            vec![Copied(Scripts), BundledMarkup],
            vec![Manifest(Scripts)],
        ),
        stage(
            "css:rev",
            vec![Selector::new(class_dist(Styles), &["**/*.css"])?],
            class_dist(Styles),
            Transform::Fingerprint(Styles),
            vec![RewrittenStyles, BundledMarkup],
            vec![Manifest(Styles)],
        ),
        stage(
            "html:minify",
            vec![Selector::new(dist, &["**/*.html"])?],
            dist.clone(),
            Transform::FinalizeMarkup,
            vec![
                BundledMarkup,
                Manifest(Scripts),
                Manifest(Styles),
                Manifest(Fonts),
                Manifest(Images),
            ],
            vec![FinalMarkup],
        ),
        stage(
            "archive:dir",
            vec![],
            layout.archive.clone(),
            Transform::CreateDir,
            vec![CleanOutput],
            vec![ArchiveDir],
        ),
        stage(
            "archive:zip",
            vec![],
            layout.archive.clone(),
            Transform::Archive {
                file: layout.archive.join(config.archive_file_name()),
            },
            // Everything that writes under dist has to be done first.
            vec![
                ArchiveDir,
                ServerConfig,
                License,
                MiscFiles,
                CompressedImages,
                RewrittenStyles,
                Manifest(Scripts),
                Manifest(Styles),
                Manifest(Fonts),
                Manifest(Images),
                FinalMarkup,
            ],
            vec![Archive],
        ),
    ])
}

/// Remove each target directory (or file). Returns how many existed.
pub fn remove_paths(targets: &[PathBuf]) -> Result<usize, StageError> {
    let mut removed = 0;
    for target in targets {
        let result = if target.is_dir() {
            fs::remove_dir_all(target)
        } else {
            fs::remove_file(target)
        };
        match result {
            Ok(()) => {
                tracing::debug!(path = %target.display(), "removed");
                removed += 1;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(removed)
}

/// Apply a text transformation to each file, writing back only files whose
/// content changed. Returns the number of files written.
pub fn rewrite_in_place<F>(files: &[SelectedFile], transform: F) -> Result<usize, StageError>
where
    F: Fn(&str) -> String,
{
    let mut changed = 0;
    for file in files {
        let original = fs::read_to_string(&file.path)?;
        let updated = transform(&original);
        if updated != original {
            fs::write(&file.path, updated)?;
            changed += 1;
        }
    }
    Ok(changed)
}
