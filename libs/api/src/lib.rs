pub mod id;
pub mod path;
pub mod request;
pub mod response;
