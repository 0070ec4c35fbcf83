//! Testing utilities for Overture.
//!
//! # Modules
//!
//! - [`mock_mirror`]: wiremock mirrors with byte-range support
//! - [`fixtures`]: archive builders and deterministic payloads
//! - [`temp_home`]: temporary `$OVERTURE_HOME` directories
//!
//! # Example
//!
//! ```rust,no_run
//! use overture_test_utils::prelude::*;
//!
//! # async fn demo() {
//! let mirror = MockMirror::start().await;
//! mirror
//!     .serve("/distributions/php-8.3.4.tar.gz", php_source_tarball("8.3.4"))
//!     .await;
//! let home = TempHome::new();
//! # let _ = home;
//! # }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod fixtures;
pub mod mock_mirror;
pub mod temp_home;

pub use fixtures::{
    TarGzBuilder, fake_php_script, pecl_tarball, php_prebuilt_tarball, php_releases_json,
    php_source_tarball, sample_bytes, sha256_hex,
};
pub use mock_mirror::{MockMirror, RangeMode, RangeResponder};
pub use temp_home::TempHome;

/// Re-export commonly used testing utilities.
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::mock_mirror::{MockMirror, RangeMode};
    pub use crate::temp_home::TempHome;
}
