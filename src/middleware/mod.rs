/// Middleware layers para o Axum router
///
/// - CORS do relay (permissivo ou restrito às origens configuradas)

pub mod cors;

pub use cors::cors_layer;
