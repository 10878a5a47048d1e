//! # Módulo de Validação da Configuração
//!
//! Valida a configuração antes de abrir o navegador, para que um erro de
//! digitação no JSON falhe em milissegundos e não depois de 30 segundos
//! de timeout na página.
//!
//! ## Validações realizadas:
//!
//! 1. **target_url**: Deve começar com http:// ou https://
//! 2. **fill_value**: Não pode ser vazio
//! 3. **Estratégias**: Listas de seletores não podem ser vazias
//! 4. **Frases**: Palavras-chave e frases de classificação não vazias
//! 5. **Tempos**: `timeout_ms` > 0, polling com intervalo > 0
//! 6. **Recuperação**: Estratégia conhecida, `max_attempts` >= 1
//!
//! Todos os erros são coletados e reportados de uma vez.

use crate::config::RenewalConfig;
use crate::errors::ErrorCode;
use crate::renewal::settle::SettlePolicy;
use crate::retry::RecoveryStrategy;
use thiserror::Error;

// ============================================================================
// TIPOS DE ERRO
// ============================================================================

/// Erros de validação da configuração.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// URL alvo sem esquema http/https.
    #[error("target_url '{url}' inválida: deve começar com http:// ou https://")]
    InvalidTargetUrl { url: String },

    /// Nada para preencher no campo.
    #[error("fill_value está vazio (defina no arquivo ou em RENEWER_FILL_VALUE)")]
    MissingFillValue,

    /// Lista de estratégias vazia.
    #[error("{field}: ao menos uma estratégia de seletor é obrigatória")]
    EmptyStrategies { field: &'static str },

    /// Conjunto de palavras-chave ou frases sem nenhum item útil.
    #[error("{field}: ao menos uma frase não vazia é obrigatória")]
    EmptyPhrases { field: &'static str },

    /// Timeout zero faria toda operação falhar.
    #[error("timeout_ms deve ser maior que zero")]
    InvalidTimeout,

    /// Polling com intervalo zero.
    #[error("settle.interval_ms deve ser maior que zero")]
    InvalidSettleInterval,

    /// Estratégia de recuperação desconhecida.
    #[error("recovery.strategy '{strategy}' desconhecida. Estratégias válidas: retry, fail_fast")]
    UnknownRecoveryStrategy { strategy: String },

    /// `max_attempts` zero.
    #[error("recovery.max_attempts deve ser pelo menos 1")]
    InvalidMaxAttempts,
}

impl ValidationError {
    /// Código estruturado correspondente.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidTargetUrl { .. } => ErrorCode::INVALID_TARGET_URL,
            Self::MissingFillValue => ErrorCode::MISSING_FILL_VALUE,
            Self::EmptyStrategies { .. } => ErrorCode::EMPTY_STRATEGIES,
            Self::EmptyPhrases { .. } => ErrorCode::EMPTY_PHRASES,
            Self::InvalidTimeout | Self::InvalidSettleInterval => ErrorCode::INVALID_TIMEOUT,
            Self::UnknownRecoveryStrategy { .. } | Self::InvalidMaxAttempts => {
                ErrorCode::INVALID_CONFIG_FORMAT
            }
        }
    }
}

impl ValidationError {
    /// Campo da configuração ao qual o erro se refere.
    pub fn field(&self) -> &'static str {
        match self {
            Self::InvalidTargetUrl { .. } => "target_url",
            Self::MissingFillValue => "fill_value",
            Self::EmptyStrategies { field } | Self::EmptyPhrases { field } => field,
            Self::InvalidTimeout => "timeout_ms",
            Self::InvalidSettleInterval => "settle.interval_ms",
            Self::UnknownRecoveryStrategy { .. } => "recovery.strategy",
            Self::InvalidMaxAttempts => "recovery.max_attempts",
        }
    }
}

/// `Ok(())` = configuração válida; `Err` = lista com todos os problemas.
pub type ValidationResult = Result<(), Vec<ValidationError>>;

// ============================================================================
// FUNÇÃO PRINCIPAL DE VALIDAÇÃO
// ============================================================================

/// Valida a configuração efetiva (depois de ambiente e interpolação).
pub fn validate_config(config: &RenewalConfig) -> ValidationResult {
    let mut errors = Vec::new();

    let url = config.target_url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        errors.push(ValidationError::InvalidTargetUrl {
            url: config.target_url.clone(),
        });
    }

    if config.fill_value.trim().is_empty() {
        errors.push(ValidationError::MissingFillValue);
    }

    if config.input_selectors.is_empty() {
        errors.push(ValidationError::EmptyStrategies {
            field: "input_selectors",
        });
    }
    if config.action_selectors.is_empty() {
        errors.push(ValidationError::EmptyStrategies {
            field: "action_selectors",
        });
    }

    let phrase_sets: [(&'static str, &[String]); 3] = [
        ("action_keywords", &config.action_keywords),
        ("cooldown_phrases", &config.cooldown_phrases),
        ("success_phrases", &config.success_phrases),
    ];
    for (field, phrases) in phrase_sets {
        if phrases.iter().all(|p| p.trim().is_empty()) {
            errors.push(ValidationError::EmptyPhrases { field });
        }
    }

    if config.timeout_ms == 0 {
        errors.push(ValidationError::InvalidTimeout);
    }

    if let SettlePolicy::UntilStable { interval_ms: 0, .. } = config.settle {
        errors.push(ValidationError::InvalidSettleInterval);
    }

    if RecoveryStrategy::parse(&config.recovery.strategy).is_none() {
        errors.push(ValidationError::UnknownRecoveryStrategy {
            strategy: config.recovery.strategy.clone(),
        });
    }
    if config.recovery.max_attempts == 0 {
        errors.push(ValidationError::InvalidMaxAttempts);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

// ============================================================================
// TESTES
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> RenewalConfig {
        RenewalConfig {
            fill_value: "nhb789.xmania.me".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn test_default_config_needs_fill_value() {
        let errors = validate_config(&RenewalConfig::default()).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], ValidationError::MissingFillValue));
        assert_eq!(errors[0].code(), ErrorCode::MISSING_FILL_VALUE);
    }

    #[test]
    fn test_invalid_url() {
        let config = RenewalConfig {
            target_url: "freexcraft.com/external-renew".to_string(),
            ..valid_config()
        };
        let errors = validate_config(&config).unwrap_err();
        assert!(matches!(errors[0], ValidationError::InvalidTargetUrl { .. }));
        assert_eq!(errors[0].field(), "target_url");
    }

    #[test]
    fn test_collects_all_errors() {
        let config = RenewalConfig {
            input_selectors: vec![],
            action_selectors: vec![],
            success_phrases: vec!["  ".to_string()],
            timeout_ms: 0,
            ..valid_config()
        };
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::EmptyPhrases { field: "success_phrases" })));
    }

    #[test]
    fn test_zero_poll_interval() {
        let config = RenewalConfig {
            settle: SettlePolicy::UntilStable {
                interval_ms: 0,
                max_ms: 1000,
            },
            ..valid_config()
        };
        let errors = validate_config(&config).unwrap_err();
        assert!(matches!(errors[0], ValidationError::InvalidSettleInterval));
    }

    #[test]
    fn test_unknown_recovery_strategy() {
        let mut config = valid_config();
        config.recovery.strategy = "pray".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors[0].to_string().contains("pray"));
    }
}
