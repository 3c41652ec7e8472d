//! Paginação "carregar mais" com supressão de duplicatas
//!
//! A API financeira pagina por `skip`/`limit` mas pode devolver registros já
//! vistos entre páginas. O cursor mantém o conjunto de IDs carregados e só
//! acrescenta registros inéditos.

use crate::types::RecordKind;
use serde_json::Value;
use std::collections::HashSet;

/// Tamanho de página usado pelas listagens
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Cursor de listagem incremental
#[derive(Debug, Clone)]
pub struct LoadMore {
    kind: RecordKind,
    page_size: usize,
    ceiling: usize,
    offset: usize,
    seen: HashSet<String>,
    items: Vec<Value>,
    has_more: bool,
}

impl LoadMore {
    pub fn new(kind: RecordKind) -> Self {
        Self::with_page_size(kind, DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(kind: RecordKind, page_size: usize) -> Self {
        Self {
            kind,
            page_size: page_size.max(1),
            ceiling: kind.default_ceiling(),
            offset: 0,
            seen: HashSet::new(),
            items: Vec::new(),
            has_more: true,
        }
    }

    /// Limite de registros acumulados quando uma página só traz duplicatas
    pub fn with_ceiling(mut self, ceiling: usize) -> Self {
        self.ceiling = ceiling;
        self
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// `skip` da próxima requisição
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn items(&self) -> &[Value] {
        &self.items
    }

    pub fn into_items(self) -> Vec<Value> {
        self.items
    }

    /// Incorpora uma página recebida e devolve quantos registros eram inéditos
    ///
    /// - página vazia encerra o cursor
    /// - registros sem ID são descartados
    /// - página curta (< `page_size`) com registros novos encerra o cursor
    /// - página só de duplicatas mantém o cursor aberto até o teto
    pub fn absorb(&mut self, page: Vec<Value>) -> usize {
        if page.is_empty() {
            self.has_more = false;
            return 0;
        }

        let received = page.len();
        let mut added = 0;

        for record in page {
            let Some(id) = self.kind.record_id(&record) else {
                continue;
            };
            if self.seen.insert(id) {
                self.items.push(record);
                added += 1;
            }
        }

        self.offset += self.page_size;

        if added > 0 {
            if received < self.page_size {
                self.has_more = false;
            }
        } else if self.items.len() >= self.ceiling {
            self.has_more = false;
        }

        tracing::debug!(
            "Página {:?}: {} recebidos, {} novos, total {}, has_more={}",
            self.kind,
            received,
            added,
            self.items.len(),
            self.has_more
        );

        added
    }

    /// Falha ao buscar a próxima página: para de tentar
    pub fn fail(&mut self) {
        self.has_more = false;
    }

    /// Remove um registro (após exclusão na API)
    pub fn remove(&mut self, id: &str) -> bool {
        let kind = self.kind;
        let before = self.items.len();
        self.items
            .retain(|record| kind.record_id(record).as_deref() != Some(id));
        before != self.items.len()
    }
}

/// Quantidade de páginas de exibição
pub fn total_pages(total_items: usize, per_page: usize) -> usize {
    if per_page == 0 {
        return 0;
    }
    total_items.div_ceil(per_page)
}

/// Fatia da página `page` (1-based) para exibição
pub fn page_slice<T>(items: &[T], page: usize, per_page: usize) -> &[T] {
    if page == 0 || per_page == 0 {
        return &[];
    }
    let start = (page - 1).saturating_mul(per_page).min(items.len());
    let end = start.saturating_add(per_page).min(items.len());
    &items[start..end]
}

/// Dispara a busca da próxima página ao chegar na penúltima página exibida
/// (nunca durante uma busca textual)
pub fn should_prefetch(page: usize, total_pages: usize, searching: bool, has_more: bool) -> bool {
    total_pages > 1 && page == total_pages - 1 && !searching && has_more
}
