//! Read access to the CNPJ registry mirror.
//!
//! The registry tables (`estabelecimento`, `empresa`, `simples`, `socios`
//! and the code tables) are loaded from the public dumps and only read
//! here. Columns are cast to `text` so rows decode the same whatever types
//! the import picked.

use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use tracing::debug;

use crate::common::error::Error;
use crate::config::CnpjDatabaseConfig;

/// Full establishment lookup, joined with company, tax regime and code
/// tables.
const QUERY_CNPJ_COMPLETO: &str = r#"
    SELECT
        emp.cnpj_basico::text
      , emp.razao_social::text
      , emp.natureza_juridica::text
      , nj.descricao::text AS natureza_juridica_descricao
      , emp.capital_social::text
      , emp.porte_empresa::text
      , est.cnpj_ordem::text
      , est.cnpj_dv::text
      , est.nome_fantasia::text
      , est.situacao_cadastral::text
      , est.data_situacao_cadastral::text
      , est.data_inicio_atividade::text
      , est.cnae_fiscal_principal::text
      , cn.descricao::text AS cnae_descricao
      , est.tipo_logradouro::text
      , est.logradouro::text
      , est.numero::text
      , est.complemento::text
      , est.bairro::text
      , est.cep::text
      , est.uf::text
      , est.municipio::text AS municipio_codigo
      , mun.descricao::text AS municipio_nome
      , est.ddd_1::text
      , est.telefone_1::text
      , est.ddd_2::text
      , est.telefone_2::text
      , est.ddd_fax::text
      , est.fax::text
      , est.correio_eletronico::text
      , est.identificador_matriz_filial::text
      , sim.opcao_pelo_simples::text
      , sim.data_opcao_simples::text
      , sim.data_exclusao_simples::text
      , sim.opcao_mei::text
      , sim.data_opcao_mei::text
      , sim.data_exclusao_mei::text
    FROM estabelecimento est
    LEFT JOIN empresa emp ON est.cnpj_basico = emp.cnpj_basico
    LEFT JOIN simples sim ON est.cnpj_basico = sim.cnpj_basico
    LEFT JOIN cnae cn ON est.cnae_fiscal_principal = cn.codigo
    LEFT JOIN munic mun ON est.municipio = mun.codigo
    LEFT JOIN natju nj ON emp.natureza_juridica = nj.codigo
    WHERE est.cnpj_basico = $1
      AND est.cnpj_ordem = $2
      AND est.cnpj_dv = $3
    LIMIT 1
"#;

/// Establishment and company columns only.
const QUERY_CNPJ_BASICO: &str = r#"
    SELECT
        est.cnpj_basico::text
      , emp.razao_social::text
      , emp.natureza_juridica::text
      , NULL::text AS natureza_juridica_descricao
      , emp.capital_social::text
      , emp.porte_empresa::text
      , est.cnpj_ordem::text
      , est.cnpj_dv::text
      , est.nome_fantasia::text
      , est.situacao_cadastral::text
      , est.data_situacao_cadastral::text
      , NULL::text AS data_inicio_atividade
      , NULL::text AS cnae_fiscal_principal
      , NULL::text AS cnae_descricao
      , NULL::text AS tipo_logradouro
      , NULL::text AS logradouro
      , NULL::text AS numero
      , NULL::text AS complemento
      , NULL::text AS bairro
      , NULL::text AS cep
      , NULL::text AS uf
      , NULL::text AS municipio_codigo
      , NULL::text AS municipio_nome
      , est.ddd_1::text
      , est.telefone_1::text
      , NULL::text AS ddd_2
      , NULL::text AS telefone_2
      , NULL::text AS ddd_fax
      , NULL::text AS fax
      , est.correio_eletronico::text
      , est.identificador_matriz_filial::text
      , NULL::text AS opcao_pelo_simples
      , NULL::text AS data_opcao_simples
      , NULL::text AS data_exclusao_simples
      , NULL::text AS opcao_mei
      , NULL::text AS data_opcao_mei
      , NULL::text AS data_exclusao_mei
    FROM estabelecimento est
    LEFT JOIN empresa emp ON est.cnpj_basico = emp.cnpj_basico
    WHERE est.cnpj_basico = $1
      AND est.cnpj_ordem = $2
      AND est.cnpj_dv = $3
    LIMIT 1
"#;

/// Partners of a company, newest first.
const QUERY_SOCIOS: &str = r#"
    SELECT
        s.nome_socio_razao_social::text
      , s.cpf_cnpj_socio::text
      , s.qualificacao_socio::text
      , q.descricao::text AS qualificacao_descricao
      , s.data_entrada_sociedade::text
      , s.faixa_etaria::text
      , p.descricao::text AS pais
      , s.representante_legal::text
      , s.nome_do_representante::text
    FROM socios s
    LEFT JOIN quals q ON s.qualificacao_socio = q.codigo
    LEFT JOIN pais p ON s.pais = p.codigo
    WHERE s.cnpj_basico = $1
    ORDER BY s.data_entrada_sociedade DESC
    LIMIT 20
"#;

const QUERY_SIMPLES: &str = r#"
    SELECT
        opcao_pelo_simples::text
      , data_opcao_simples::text
      , data_exclusao_simples::text
      , opcao_mei::text
      , data_opcao_mei::text
      , data_exclusao_mei::text
    FROM simples
    WHERE cnpj_basico = $1
    LIMIT 1
"#;

const QUERY_CNPJ_EXISTS: &str = r#"
    SELECT EXISTS(
        SELECT 1 FROM estabelecimento
        WHERE cnpj_basico = $1
          AND cnpj_ordem = $2
          AND cnpj_dv = $3
    )
"#;

/// Raw establishment row.
#[derive(Debug, Clone, Default, PartialEq, Eq, FromRow)]
pub struct RawCompany {
    /// First 8 digits of the CNPJ.
    pub cnpj_basico: Option<String>,
    /// Legal name.
    pub razao_social: Option<String>,
    /// Legal nature code.
    pub natureza_juridica: Option<String>,
    /// Legal nature description.
    pub natureza_juridica_descricao: Option<String>,
    /// Share capital as stored.
    pub capital_social: Option<String>,
    /// Company size code.
    pub porte_empresa: Option<String>,
    /// Establishment number.
    pub cnpj_ordem: Option<String>,
    /// Check digits.
    pub cnpj_dv: Option<String>,
    /// Trade name.
    pub nome_fantasia: Option<String>,
    /// Registration status code.
    pub situacao_cadastral: Option<String>,
    /// Date of the current status.
    pub data_situacao_cadastral: Option<String>,
    /// Opening date.
    pub data_inicio_atividade: Option<String>,
    /// Main CNAE code.
    pub cnae_fiscal_principal: Option<String>,
    /// Main CNAE description.
    pub cnae_descricao: Option<String>,
    /// Street type.
    pub tipo_logradouro: Option<String>,
    /// Street name.
    pub logradouro: Option<String>,
    /// Street number.
    pub numero: Option<String>,
    /// Address complement.
    pub complemento: Option<String>,
    /// Neighbourhood.
    pub bairro: Option<String>,
    /// Postal code.
    pub cep: Option<String>,
    /// State code.
    pub uf: Option<String>,
    /// City code.
    pub municipio_codigo: Option<String>,
    /// City name.
    pub municipio_nome: Option<String>,
    /// First phone area code.
    pub ddd_1: Option<String>,
    /// First phone.
    pub telefone_1: Option<String>,
    /// Second phone area code.
    pub ddd_2: Option<String>,
    /// Second phone.
    pub telefone_2: Option<String>,
    /// Fax area code.
    pub ddd_fax: Option<String>,
    /// Fax.
    pub fax: Option<String>,
    /// Email.
    pub correio_eletronico: Option<String>,
    /// `1` headquarters, `2` branch.
    pub identificador_matriz_filial: Option<String>,
    /// `S` when in the Simples Nacional.
    pub opcao_pelo_simples: Option<String>,
    /// Simples opt-in date.
    pub data_opcao_simples: Option<String>,
    /// Simples exit date.
    pub data_exclusao_simples: Option<String>,
    /// `S` when registered as MEI.
    pub opcao_mei: Option<String>,
    /// MEI registration date.
    pub data_opcao_mei: Option<String>,
    /// MEI exit date.
    pub data_exclusao_mei: Option<String>,
}

/// Raw partner row.
#[derive(Debug, Clone, Default, PartialEq, Eq, FromRow)]
pub struct RawPartner {
    /// Partner name.
    pub nome_socio_razao_social: Option<String>,
    /// Masked partner document.
    pub cpf_cnpj_socio: Option<String>,
    /// Role code.
    pub qualificacao_socio: Option<String>,
    /// Role description.
    pub qualificacao_descricao: Option<String>,
    /// Date the partner joined.
    pub data_entrada_sociedade: Option<String>,
    /// Age bracket code.
    pub faixa_etaria: Option<String>,
    /// Country name.
    pub pais: Option<String>,
    /// Legal representative document.
    pub representante_legal: Option<String>,
    /// Legal representative name.
    pub nome_do_representante: Option<String>,
}

/// Raw tax regime row.
#[derive(Debug, Clone, Default, PartialEq, Eq, FromRow)]
pub struct RawSimples {
    /// `S` when in the Simples Nacional.
    pub opcao_pelo_simples: Option<String>,
    /// Opt-in date.
    pub data_opcao_simples: Option<String>,
    /// Exit date.
    pub data_exclusao_simples: Option<String>,
    /// `S` when registered as MEI.
    pub opcao_mei: Option<String>,
    /// MEI registration date.
    pub data_opcao_mei: Option<String>,
    /// MEI exit date.
    pub data_exclusao_mei: Option<String>,
}

/// One row of a prospecting search.
#[derive(Debug, Clone, Default, PartialEq, Eq, FromRow)]
pub struct SearchRow {
    /// The 14 digit CNPJ.
    pub cnpj: Option<String>,
    /// Legal name.
    pub razao_social: Option<String>,
    /// Trade name.
    pub nome_fantasia: Option<String>,
    /// Email.
    pub email: Option<String>,
    /// Area code followed by the number.
    pub telefone: Option<String>,
    /// State code.
    pub uf: Option<String>,
    /// City name.
    pub municipio: Option<String>,
    /// Main CNAE code.
    pub cnae: Option<String>,
    /// Main CNAE description.
    pub cnae_descricao: Option<String>,
    /// Company size code.
    pub porte: Option<String>,
    /// Share capital as stored.
    pub capital_social: Option<String>,
    /// Registration status code.
    pub situacao: Option<String>,
    /// Opening date.
    pub data_abertura: Option<String>,
    /// `1` headquarters, `2` branch.
    pub tipo: Option<String>,
    /// `S`, `N` or unknown.
    pub simples: Option<String>,
    /// `S`, `N` or unknown.
    pub mei: Option<String>,
}

/// Counts of the stats preview.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromRow)]
pub struct StatsRow {
    /// Matching establishments.
    pub total: i64,
    /// With an email.
    pub com_email: i64,
    /// With a phone.
    pub com_telefone: i64,
    /// With both.
    pub com_email_e_telefone: i64,
}

/// A CNAE code.
#[derive(Debug, Clone, Default, PartialEq, Eq, FromRow)]
pub struct RawCnae {
    /// The code.
    pub codigo: String,
    /// The description.
    pub descricao: Option<String>,
}

/// The three parts of a CNPJ, as stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CnpjParts {
    /// First 8 digits.
    pub basico: String,
    /// Next 4 digits.
    pub ordem: String,
    /// Last 2 digits.
    pub dv: String,
}

/// Read only store over the registry mirror.
#[derive(Debug, Clone)]
pub struct CnpjStore(PgPool);

impl From<PgPool> for CnpjStore {
    fn from(value: PgPool) -> Self {
        Self(value)
    }
}

impl CnpjStore {
    /// Create a pool for the configured endpoint, if there is one.
    /// Connections are opened on first use so that a down database does not
    /// keep the other endpoints from starting.
    pub fn connect_lazy(config: &CnpjDatabaseConfig) -> Result<Option<Self>, Error> {
        let Some(endpoint) = &config.endpoint else {
            return Ok(None);
        };

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .idle_timeout(std::time::Duration::from_secs(20))
            .connect_lazy(endpoint.as_str())?;

        Ok(Some(Self(pool)))
    }

    /// Full record of an establishment.
    pub async fn get_company(&self, cnpj: &CnpjParts) -> Result<Option<RawCompany>, Error> {
        debug!(basico = %cnpj.basico, "fetching full record");
        sqlx::query_as::<_, RawCompany>(QUERY_CNPJ_COMPLETO)
            .bind(&cnpj.basico)
            .bind(&cnpj.ordem)
            .bind(&cnpj.dv)
            .fetch_optional(&self.0)
            .await
            .map_err(Error::from)
    }

    /// Establishment with company columns only.
    pub async fn get_company_basic(&self, cnpj: &CnpjParts) -> Result<Option<RawCompany>, Error> {
        sqlx::query_as::<_, RawCompany>(QUERY_CNPJ_BASICO)
            .bind(&cnpj.basico)
            .bind(&cnpj.ordem)
            .bind(&cnpj.dv)
            .fetch_optional(&self.0)
            .await
            .map_err(Error::from)
    }

    /// Up to 20 partners of a company.
    pub async fn get_partners(&self, basico: &str) -> Result<Vec<RawPartner>, Error> {
        sqlx::query_as::<_, RawPartner>(QUERY_SOCIOS)
            .bind(basico)
            .fetch_all(&self.0)
            .await
            .map_err(Error::from)
    }

    /// Tax regime of a company.
    pub async fn get_simples(&self, basico: &str) -> Result<Option<RawSimples>, Error> {
        sqlx::query_as::<_, RawSimples>(QUERY_SIMPLES)
            .bind(basico)
            .fetch_optional(&self.0)
            .await
            .map_err(Error::from)
    }

    /// Whether the establishment exists.
    pub async fn exists(&self, cnpj: &CnpjParts) -> Result<bool, Error> {
        sqlx::query_scalar::<_, bool>(QUERY_CNPJ_EXISTS)
            .bind(&cnpj.basico)
            .bind(&cnpj.ordem)
            .bind(&cnpj.dv)
            .fetch_one(&self.0)
            .await
            .map_err(Error::from)
    }

    /// Run a search and its count concurrently.
    pub async fn search(
        &self,
        mut rows: QueryBuilder<'_, Postgres>,
        mut count: QueryBuilder<'_, Postgres>,
    ) -> Result<(Vec<SearchRow>, i64), Error> {
        let rows_query = rows.build_query_as::<SearchRow>().fetch_all(&self.0);
        let count_query = count.build_query_scalar::<i64>().fetch_one(&self.0);
        let (rows, total) = futures::try_join!(rows_query, count_query)?;
        Ok((rows, total))
    }

    /// Run a stats query.
    pub async fn stats(&self, mut query: QueryBuilder<'_, Postgres>) -> Result<StatsRow, Error> {
        query
            .build_query_as::<StatsRow>()
            .fetch_one(&self.0)
            .await
            .map_err(Error::from)
    }

    /// Run a CNAE lookup.
    pub async fn cnaes(&self, mut query: QueryBuilder<'_, Postgres>) -> Result<Vec<RawCnae>, Error> {
        query
            .build_query_as::<RawCnae>()
            .fetch_all(&self.0)
            .await
            .map_err(Error::from)
    }

    /// Database clock, as a connectivity check.
    pub async fn now(&self) -> Result<String, Error> {
        sqlx::query_scalar::<_, String>("SELECT NOW()::text")
            .fetch_one(&self.0)
            .await
            .map_err(Error::from)
    }
}
