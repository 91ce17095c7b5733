pub mod base;

pub mod aws;
pub mod azure;

pub use aws::AwsNormalizer;
pub use azure::AzureNormalizer;
pub use base::{NormalizerServices, ProviderNormalizer};
