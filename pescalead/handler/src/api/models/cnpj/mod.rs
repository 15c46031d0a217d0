//! Company registry records as returned by the CNPJ endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Requests.
pub mod requests;
/// Responses.
pub mod responses;

/// Name of the data source reported on every lookup.
pub const PROVIDER: &str = "banco_local";

/// A company establishment with its registry data.
#[derive(Clone, Default, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CnpjRecord {
    /// The 14 digit CNPJ.
    pub cnpj: String,
    /// First 8 digits, shared by every establishment of the company.
    pub cnpj_basico: String,
    /// Establishment number.
    pub cnpj_ordem: String,
    /// Check digits.
    pub cnpj_dv: String,
    /// Legal name.
    pub razao_social: Option<String>,
    /// Trade name.
    pub nome_fantasia: Option<String>,
    /// Decoded company size.
    pub porte: Option<String>,
    /// Company size code.
    pub porte_codigo: Option<String>,
    /// Legal nature description.
    pub natureza_juridica: Option<String>,
    /// Legal nature code.
    pub natureza_juridica_codigo: Option<String>,
    /// Decoded registration status, e.g. `Ativa`.
    pub situacao_cadastral: Option<String>,
    /// Registration status code.
    pub situacao_cadastral_codigo: Option<String>,
    /// `YYYY-MM-DD`
    pub data_situacao_cadastral: Option<String>,
    /// `YYYY-MM-DD`
    pub data_inicio_atividade: Option<String>,
    /// `MATRIZ` or `FILIAL`.
    pub tipo: Option<String>,
    /// Share capital in BRL.
    pub capital_social: Option<f64>,
    /// Address.
    pub endereco: Endereco,
    /// Contact data.
    pub contato: Contato,
    /// Main activity.
    pub atividade: Atividade,
    /// Tax regime.
    pub simples: Simples,
    /// Partners; only present on the full lookup.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub socios: Option<Vec<Socio>>,
}

/// Establishment address.
#[derive(Clone, Default, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Endereco {
    /// Street type, e.g. `RUA`.
    pub tipo_logradouro: Option<String>,
    /// Street name.
    pub logradouro: Option<String>,
    /// Street number.
    pub numero: Option<String>,
    /// Address complement.
    pub complemento: Option<String>,
    /// Neighbourhood.
    pub bairro: Option<String>,
    /// City name.
    pub municipio: Option<String>,
    /// City code from the registry.
    pub municipio_codigo: Option<String>,
    /// State code.
    pub uf: Option<String>,
    /// Digits only.
    pub cep: Option<String>,
}

/// Establishment contact data.
#[derive(Clone, Default, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Contato {
    /// Lowercase email.
    pub email: Option<String>,
    /// Area code and number, digits only.
    pub telefone_1: Option<String>,
    /// `(DD) NNNNN-NNNN`
    pub telefone_1_formatted: Option<String>,
    /// Second phone, digits only.
    pub telefone_2: Option<String>,
    /// Second phone, formatted.
    pub telefone_2_formatted: Option<String>,
    /// Fax, digits only.
    pub fax: Option<String>,
}

/// Main economic activity.
#[derive(Clone, Default, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Atividade {
    /// Main CNAE code.
    pub cnae_principal: Option<String>,
    /// CNAE description.
    pub cnae_descricao: Option<String>,
}

/// Simplified tax regime membership.
#[derive(Clone, Default, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Simples {
    /// Opted into the Simples Nacional.
    pub opcao_simples: bool,
    /// Date the company opted in.
    pub data_opcao_simples: Option<String>,
    /// Date the company left.
    pub data_exclusao_simples: Option<String>,
    /// Registered as MEI.
    pub opcao_mei: bool,
    /// Date of the MEI registration.
    pub data_opcao_mei: Option<String>,
    /// Date the MEI registration ended.
    pub data_exclusao_mei: Option<String>,
}

/// A partner of the company.
#[derive(Clone, Default, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Socio {
    /// Partner name.
    pub nome: Option<String>,
    /// Masked CPF or CNPJ of the partner.
    pub cpf_cnpj: Option<String>,
    /// Partner role description.
    pub qualificacao: Option<String>,
    /// Partner role code.
    pub qualificacao_codigo: Option<String>,
    /// Date the partner joined.
    pub data_entrada: Option<String>,
    /// Decoded age bracket.
    pub faixa_etaria: Option<String>,
    /// Country, for foreign partners.
    pub pais: Option<String>,
    /// Legal representative document.
    pub representante_legal: Option<String>,
    /// Legal representative name.
    pub nome_representante: Option<String>,
}

/// One row of a prospecting search.
#[derive(Clone, Default, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SearchResultItem {
    /// The 14 digit CNPJ.
    pub cnpj: String,
    /// Legal name.
    pub razao_social: Option<String>,
    /// Trade name.
    pub nome_fantasia: Option<String>,
    /// Lowercase email.
    pub email: Option<String>,
    /// Area code and number, digits only.
    pub telefone: Option<String>,
    /// State code.
    pub uf: Option<String>,
    /// City name.
    pub municipio: Option<String>,
    /// Main CNAE code.
    pub cnae: Option<String>,
    /// CNAE description.
    pub cnae_descricao: Option<String>,
    /// Decoded company size.
    pub porte: Option<String>,
    /// Share capital in BRL.
    pub capital_social: Option<f64>,
    /// Decoded registration status.
    pub situacao: Option<String>,
    /// Opening date, `YYYY-MM-DD`.
    pub data_abertura: Option<String>,
    /// `MATRIZ` or `FILIAL`.
    pub tipo: Option<String>,
    /// Unknown unless the search filtered on the tax regime.
    pub simples: Option<bool>,
    /// Registered as MEI, when known.
    pub mei: Option<bool>,
}

/// Value and label of a selectable filter option.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FilterOption {
    /// Value sent back in filters.
    pub value: String,
    /// Human readable label.
    pub label: String,
}
