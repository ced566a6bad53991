pub(crate) mod identity;
pub(crate) mod request;
pub(crate) mod response;
