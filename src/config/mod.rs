//! Country and path configuration.

pub mod country;
pub mod path;

pub use country::{
    validate_iso3, CodAbConfig, CountryConfig, FewsNetConfig, GlofasConfig, ReportingPoint,
    UsgsNdviConfig,
};
pub use path::{Access, Coverage, PathConfig, SourceDirs};
