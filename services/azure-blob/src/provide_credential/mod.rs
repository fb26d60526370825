mod static_provider;
pub use static_provider::StaticCredentialProvider;

mod imds;
pub use imds::ImdsCredentialProvider;
