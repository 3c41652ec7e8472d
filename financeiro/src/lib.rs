//! Cliente da API financeira (`financeiro.vstec.net`)
//!
//! Cobre o que as telas de listagem consomem:
//!
//! - **Login**: `/auth/login` (form-urlencoded, token em `access`/`token`/`access_token`)
//! - **Clientes**: `/clientes/`, `/clientes/{id}`, `/clientes/consultar/`
//! - **Planos de pagamento**: `/planos-pagamentos/`, `/planos-pagamentos/consultar/`
//!
//! Listagens usam [`LoadMore`], que pagina por `skip`/`limit` e descarta
//! registros repetidos entre páginas.
//!
//! # Exemplo Básico
//!
//! ```rust,ignore
//! use financeiro::{FinanceiroClient, LoadMore, RecordKind, Session};
//!
//! #[tokio::main]
//! async fn main() -> financeiro::Result<()> {
//!     let username = std::env::var("FINANCEIRO_USERNAME").unwrap_or_default();
//!     let password = std::env::var("FINANCEIRO_PASSWORD").unwrap_or_default();
//!
//!     let client = FinanceiroClient::new("http://financeiro.vstec.net")?;
//!     let mut session = Session::new();
//!     client.authenticate(&mut session, &username, &password, false).await?;
//!
//!     let token = session.token().unwrap_or_default();
//!     let mut cursor = LoadMore::new(RecordKind::Cliente);
//!     while cursor.has_more() {
//!         client.load_next(token, &mut cursor).await?;
//!     }
//!     println!("{} clientes", cursor.items().len());
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod error;
pub mod pagination;
pub mod session;
pub mod types;

pub use client::FinanceiroClient;
pub use error::{FinanceiroError, Result};
pub use pagination::{page_slice, should_prefetch, total_pages, LoadMore, DEFAULT_PAGE_SIZE};
pub use session::Session;
pub use types::{display_name, is_cpf, records_from, RecordKind};
