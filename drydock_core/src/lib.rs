pub mod error;
pub use error::{Error, Result};

pub mod fingerprint;
pub mod types;
pub use types::{Chart, LoadResult, ObjectRef, Release, Resource};

pub mod jsonnet;
pub mod manifest;

pub mod scan;
pub use scan::ScanResult;

pub mod plan;
pub use plan::LoadOptions;

pub mod blob;
pub use blob::Blob;

pub mod kv;
pub use kv::Kv;

pub mod para;

pub mod logio;

pub mod tmp;

pub mod kube_client;

pub mod sync;
