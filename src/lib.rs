// Library root
// -----------
// The `uploader` binary (`main.rs`) parses arguments and hands off to
// these modules.
//
// Module responsibilities:
// - `config`: `strava_config.json` and the `STRAVA_*` environment
//   fallback.
// - `api`: HTTP calls to Strava (uploads, upload status, OAuth token).
// - `upload`: create-then-poll flow for one file and for a glob batch.
// - `ui`: console output, spinner, and the interactive OAuth flows.
// - `error`: the error enum shared by the modules above.
pub mod api;
pub mod config;
pub mod error;
pub mod ui;
pub mod upload;

pub use error::{Result, UploadError};
