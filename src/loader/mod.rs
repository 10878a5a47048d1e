//! # Módulo de Carregamento - Leitura da Configuração
//!
//! Este módulo é responsável por **ler e preparar** a configuração da
//! renovação antes de qualquer navegador ser aberto.
//!
//! ## O que este módulo faz?
//!
//! 1. Lê o arquivo JSON do disco (se informado)
//! 2. Converte o JSON em `RenewalConfig` (campos ausentes usam o padrão)
//! 3. Aplica as variáveis de ambiente `RENEWER_*`
//! 4. Resolve placeholders `${...}`
//!
//! ## Exemplo de uso:
//!
//! ```ignore
//! let config = load_config(Some(Path::new("./renewer.json")))?;
//! println!("Alvo: {}", config.target_url);
//! ```

use crate::config::RenewalConfig;
use crate::errors::ErrorCode;
use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::path::Path;

/// Carrega uma configuração de um arquivo JSON, sem ambiente nem interpolação.
///
/// ## Exemplos de erro:
/// - "Failed to read config file" → Arquivo não existe ou sem permissão
/// - "Failed to parse config JSON" → JSON malformado ou seletor inválido
pub fn load_config_from_file<P: AsRef<Path>>(path: P) -> Result<RenewalConfig> {
    let path_ref = path.as_ref();

    let content = fs::read_to_string(path_ref)
        .with_context(|| format!("Failed to read config file {:?}", path_ref))?;

    let config = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config JSON {:?}", path_ref))?;

    Ok(config)
}

/// Monta a configuração efetiva de uma execução.
///
/// Sem arquivo, parte dos valores padrão. O ambiente sempre tem a
/// palavra final, e a interpolação roda por último.
pub fn load_config(path: Option<&Path>) -> Result<RenewalConfig> {
    let mut config = match path {
        Some(p) => load_config_from_file(p)?,
        None => RenewalConfig::default(),
    };

    config.apply_env();
    config
        .interpolate()
        .context("Failed to resolve placeholders in config")?;

    Ok(config)
}

/// Traduz uma falha de carregamento para o código estruturado.
///
/// Percorre a cadeia de causas do `anyhow::Error`:
/// - `io::Error` NotFound → E4002
/// - `serde_json::Error` citando seletor → E1002, demais → E1007
/// - Placeholder `${ENV_...}` sem variável → E4001
pub fn load_error_code(err: &anyhow::Error) -> ErrorCode {
    for cause in err.chain() {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            if io_err.kind() == io::ErrorKind::NotFound {
                return ErrorCode::CONFIG_FILE_NOT_FOUND;
            }
        }
        if let Some(json_err) = cause.downcast_ref::<serde_json::Error>() {
            return if json_err.to_string().contains("selector") {
                ErrorCode::INVALID_SELECTOR
            } else {
                ErrorCode::INVALID_CONFIG_FORMAT
            };
        }
        if cause.to_string().starts_with("Missing environment variable") {
            return ErrorCode::ENV_VAR_NOT_FOUND;
        }
    }
    ErrorCode::INTERNAL_ERROR
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "target_url": "https://renew.example.test", "fill_value": "abc", "action_keywords": ["renovar"] }}"#
        )
        .unwrap();

        let config = load_config_from_file(file.path()).unwrap();
        assert_eq!(config.target_url, "https://renew.example.test");
        assert_eq!(config.action_keywords, vec!["renovar"]);
    }

    #[test]
    fn test_missing_file_has_context() {
        let err = load_config_from_file("/definitely/not/here.json").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
        assert_eq!(load_error_code(&err), ErrorCode::CONFIG_FILE_NOT_FOUND);
    }

    #[test]
    fn test_invalid_selector_rejected_at_parse() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "input_selectors": ["button:has-text(Renew)"] }}"#).unwrap();

        let err = load_config_from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config JSON"));
        assert_eq!(load_error_code(&err), ErrorCode::INVALID_SELECTOR);
    }

    #[test]
    fn test_malformed_json_code() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "timeout_ms": "soon" "#).unwrap();

        let err = load_config_from_file(file.path()).unwrap_err();
        assert_eq!(load_error_code(&err), ErrorCode::INVALID_CONFIG_FORMAT);
    }

    #[test]
    fn test_missing_env_placeholder_code() {
        std::env::remove_var("RENEWER_URL");
        std::env::remove_var("RENEWER_LOADER_UNSET_HOST");
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "target_url": "https://${{ENV_RENEWER_LOADER_UNSET_HOST}}/renew" }}"#
        )
        .unwrap();

        let err = load_config(Some(file.path())).unwrap_err();
        assert_eq!(load_error_code(&err), ErrorCode::ENV_VAR_NOT_FOUND);
    }

    #[test]
    fn test_load_config_interpolates_after_reading() {
        std::env::remove_var("RENEWER_FILL_VALUE");
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "fill_value": "${{name}}.xmania.me", "variables": {{ "name": "srv" }} }}"#
        )
        .unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.fill_value, "srv.xmania.me");
    }
}
