pub mod api_keys;
pub mod links;
pub mod redirect;
pub mod system;
pub mod webhooks;
