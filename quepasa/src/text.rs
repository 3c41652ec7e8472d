//! Utilitários de texto para logs e mensagens de erro

/// Prefixo de no máximo `max_bytes` sem cortar caractere UTF-8
///
/// Corpos de resposta do middleware podem trazer acentos e emojis; cortar
/// no meio de um caractere causaria panic no slice.
///
/// ```
/// use quepasa::truncate_safe;
///
/// assert_eq!(truncate_safe("Conexão", 6), "Conex");
/// ```
pub fn truncate_safe(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }

    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }

    &s[..end]
}
