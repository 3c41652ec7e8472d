//! Cliente HTTP para a API financeira

use crate::error::{FinanceiroError, Result};
use crate::pagination::{LoadMore, DEFAULT_PAGE_SIZE};
use crate::session::Session;
use crate::types::{is_cpf, records_from, RecordKind};
use reqwest::{Client as HttpClient, Response};
use serde_json::Value;
use std::time::Duration;

/// Campos onde a API pode devolver o token, em ordem de preferência
const TOKEN_FIELDS: [&str; 3] = ["access", "token", "access_token"];

/// Cliente da API financeira (clientes, contratos, planos de pagamento)
#[derive(Clone, Debug)]
pub struct FinanceiroClient {
    http_client: HttpClient,
    base_url: String,
}

impl FinanceiroClient {
    /// Cria um novo cliente
    ///
    /// # Timeouts
    ///
    /// - Total: 30s
    /// - Connect: 5s
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| {
                FinanceiroError::ConfigError(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `POST /auth/login` (form-urlencoded) e devolve o token de acesso
    pub async fn login(&self, username: &str, password: &str) -> Result<String> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(FinanceiroError::ValidationError(
                "usuário e senha são obrigatórios".to_string(),
            ));
        }

        let url = format!("{}/auth/login", self.base_url);
        tracing::debug!("POST {} (user: {})", url, username);

        let response = self
            .http_client
            .post(&url)
            .form(&[("username", username), ("password", password)])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            tracing::warn!("Login recusado pela API financeira ({})", status);
            return Err(FinanceiroError::AuthError(format!(
                "Falha ao autenticar (status {})",
                status
            )));
        }

        let body: Value = response.json().await?;
        TOKEN_FIELDS
            .iter()
            .find_map(|field| body.get(*field).and_then(Value::as_str))
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .ok_or_else(|| FinanceiroError::AuthError("Token não encontrado na resposta".to_string()))
    }

    /// Faz login e inicia a sessão
    pub async fn authenticate(
        &self,
        session: &mut Session,
        username: &str,
        password: &str,
        remember: bool,
    ) -> Result<()> {
        let token = self.login(username, password).await?;
        session.start(token, username, remember);
        tracing::info!("✅ Sessão iniciada para {}", username);
        Ok(())
    }

    /// Página de uma coleção (`?limit=&skip=`)
    pub async fn list(&self, kind: RecordKind, token: &str, skip: usize, limit: usize) -> Result<Vec<Value>> {
        let endpoint = format!("{}?limit={}&skip={}", kind.collection_path(), limit, skip);
        let value = self.get_json(token, &endpoint).await?;
        Ok(records_from(value))
    }

    pub async fn list_clientes(&self, token: &str, skip: usize, limit: usize) -> Result<Vec<Value>> {
        self.list(RecordKind::Cliente, token, skip, limit).await
    }

    pub async fn list_planos(&self, token: &str, skip: usize, limit: usize) -> Result<Vec<Value>> {
        self.list(RecordKind::PlanoPagamento, token, skip, limit).await
    }

    /// Busca a próxima página do cursor e incorpora os registros inéditos
    ///
    /// Em caso de erro o cursor é encerrado.
    pub async fn load_next(&self, token: &str, cursor: &mut LoadMore) -> Result<usize> {
        if !cursor.has_more() {
            return Ok(0);
        }

        match self
            .list(cursor.kind(), token, cursor.offset(), cursor.page_size())
            .await
        {
            Ok(page) => Ok(cursor.absorb(page)),
            Err(e) => {
                tracing::error!("Erro ao carregar mais registros ({:?}): {}", cursor.kind(), e);
                cursor.fail();
                Err(e)
            }
        }
    }

    /// Busca de clientes: CPF vai em `cpf=`, qualquer outro termo em `nome=`
    pub async fn search_clientes(&self, token: &str, term: &str) -> Result<Vec<Value>> {
        let term = required_term(term)?;
        let filter = if is_cpf(term) { "cpf" } else { "nome" };
        let endpoint = format!(
            "/clientes/?limit={}&{}={}",
            DEFAULT_PAGE_SIZE,
            filter,
            urlencoding::encode(term)
        );
        Ok(records_from(self.get_json(token, &endpoint).await?))
    }

    /// `GET /clientes/consultar/?dado=nome&valor=`
    pub async fn consultar_clientes(&self, token: &str, valor: &str) -> Result<Vec<Value>> {
        let valor = required_term(valor)?;
        let endpoint = format!(
            "/clientes/consultar/?dado=nome&valor={}",
            urlencoding::encode(valor)
        );
        Ok(records_from(self.get_json(token, &endpoint).await?))
    }

    /// `GET /clientes/{id}`
    pub async fn get_cliente(&self, token: &str, id: &str) -> Result<Value> {
        self.get_json(token, &format!("/clientes/{}", urlencoding::encode(id)))
            .await
    }

    /// `GET /planos-pagamentos/consultar/?dado=nome&valor=`
    pub async fn search_planos(&self, token: &str, valor: &str) -> Result<Vec<Value>> {
        let valor = required_term(valor)?;
        let endpoint = format!(
            "/planos-pagamentos/consultar/?dado=nome&valor={}",
            urlencoding::encode(valor)
        );
        Ok(records_from(self.get_json(token, &endpoint).await?))
    }

    /// `DELETE /planos-pagamentos/{id}`
    pub async fn delete_plano(&self, token: &str, id: &str) -> Result<()> {
        let url = format!(
            "{}/planos-pagamentos/{}",
            self.base_url,
            urlencoding::encode(id)
        );
        tracing::debug!("DELETE {}", url);

        let response = self.http_client.delete(&url).bearer_auth(token).send().await?;
        self.handle_response(response).await?;
        tracing::info!("🗑️ Plano {} excluído", id);
        Ok(())
    }

    async fn get_json(&self, token: &str, endpoint: &str) -> Result<Value> {
        let url = format!("{}{}", self.base_url, endpoint);
        tracing::debug!("GET {}", url);

        let response = self.http_client.get(&url).bearer_auth(token).send().await?;
        let response = self.handle_response(response).await?;
        Ok(response.json().await?)
    }

    /// Processa a resposta HTTP e trata erros
    async fn handle_response(&self, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let status_code = status.as_u16();
        let error_body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        tracing::error!("Financeiro API error ({}): {}", status_code, error_body);

        let message = match serde_json::from_str::<Value>(&error_body) {
            Ok(json) => json
                .get("detail")
                .or_else(|| json.get("error"))
                .or_else(|| json.get("message"))
                .and_then(|v| v.as_str())
                .unwrap_or(&error_body)
                .to_string(),
            Err(_) => error_body,
        };

        Err(FinanceiroError::ApiError {
            status: status_code,
            message,
        })
    }
}

fn required_term(term: &str) -> Result<&str> {
    let term = term.trim();
    if term.is_empty() {
        return Err(FinanceiroError::ValidationError(
            "termo de busca vazio".to_string(),
        ));
    }
    Ok(term)
}
