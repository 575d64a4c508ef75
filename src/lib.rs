//! # h5bp-build
//!
//! Asset build pipeline for HTML5 Boilerplate style front-end projects.
//! A project keeps its sources under `src/` (markup, `js/`, `css/`, `img/`,
//! `fonts/`) and the pipeline turns them into a deployable `dist/` tree,
//! optionally zipped into `archive/<name>_v<version>.zip`.
//!
//! # Architecture: Ordered Stage Groups
//!
//! Every step is a named [`stage::Stage`]: the files it reads, where it
//! writes and the transform it applies. Stages are grouped; groups run in
//! order and the stages inside a group run concurrently:
//!
//! ```text
//! clean, lint      wipe dist/archive, lint scripts
//! compile          LESS/SCSS → src/css, sprite sheet → src/img
//! copy             src → dist (server config, license, misc, assets, markup)
//! optimize         compress images, add vendor prefixes
//! fingerprint      rename assets to name-<digest>.ext, record manifests
//! rewrite          point stylesheets and markup at fingerprinted names
//! bundle, minify   production only
//! archive          zip dist/ (archive run only)
//! ```
//!
//! Fingerprint manifests are the only state shared between stages besides
//! the file trees themselves. They live in the temp directory and are
//! removed after a full run.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`pipeline`] | Plans, group ordering validation, concurrent group execution, progress events |
//! | [`stage`] | Stage descriptors, artifacts, and the per-transform runner |
//! | [`stages`] | The stage catalog and the transforms: lint, compile, copy, sprite, compress, prefix, bundle, minify |
//! | [`fingerprint`] | Content digests, fingerprinted names, and per-class manifests |
//! | [`rewrite`] | Reference rewriting against a manifest |
//! | [`archive`] | Zip archive of the output tree |
//! | [`selector`] | Glob-based file selection relative to a base directory |
//! | [`cache`] | Content-addressed cache for compressed images |
//! | [`watch`] | Polling file watcher that triggers rebuilds |
//! | [`config`] | Layered `h5bp.toml` loading, validation, and directory layout |
//! | [`types`] | Build mode and asset classes |
//! | [`output`] | CLI output formatting for runs, plans, and watch events |
//!
//! # Design Decisions
//!
//! ## Declared Artifacts Instead of Implicit Ordering
//!
//! Each stage names the artifacts it requires and produces. A planned run is
//! checked before it starts: every requirement must be produced by an
//! earlier group, and no two stages of a group may produce the same thing.
//! Two concurrent stages writing the same file would otherwise race.
//!
//! ## Dist-Relative Manifest Keys
//!
//! Manifest keys are output-root relative (`js/main.js`, `img/logo.png`).
//! References in markup and stylesheets are rewritten by matching those keys
//! on path boundaries, longest first, so `main.js` never clobbers
//! `vendor/main.js`.
//!
//! ## External LESS Compiler
//!
//! SCSS is compiled in-process with `grass`. LESS has no Rust compiler, so
//! it is piped through a configurable command (`lessc` by default).

pub mod archive;
pub mod cache;
pub mod config;
pub mod fingerprint;
pub mod output;
pub mod pipeline;
pub mod rewrite;
pub mod selector;
pub mod stage;
pub mod stages;
pub mod types;
pub mod watch;

#[cfg(test)]
pub(crate) mod test_helpers;
