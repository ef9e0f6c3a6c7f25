//! HTTP handlers. Each one maps a request onto a service call and the
//! result onto JSON; all decisions live in the services.

pub mod blob_handlers;
pub mod file_handlers;
pub mod health_handlers;
pub mod text_handlers;
