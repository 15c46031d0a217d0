//! Catalog of the prospecting filters, as shown by the filters endpoint.

use crate::api::models::cnpj::responses::{
    FilterCatalog, FilterDefinition, FilterKind, RangePreset,
};
use crate::api::models::cnpj::FilterOption;

/// States with their names.
pub const UF_OPTIONS: &[(&str, &str)] = &[
    ("AC", "Acre"),
    ("AL", "Alagoas"),
    ("AP", "Amapá"),
    ("AM", "Amazonas"),
    ("BA", "Bahia"),
    ("CE", "Ceará"),
    ("DF", "Distrito Federal"),
    ("ES", "Espírito Santo"),
    ("GO", "Goiás"),
    ("MA", "Maranhão"),
    ("MT", "Mato Grosso"),
    ("MS", "Mato Grosso do Sul"),
    ("MG", "Minas Gerais"),
    ("PA", "Pará"),
    ("PB", "Paraíba"),
    ("PR", "Paraná"),
    ("PE", "Pernambuco"),
    ("PI", "Piauí"),
    ("RJ", "Rio de Janeiro"),
    ("RN", "Rio Grande do Norte"),
    ("RS", "Rio Grande do Sul"),
    ("RO", "Rondônia"),
    ("RR", "Roraima"),
    ("SC", "Santa Catarina"),
    ("SP", "São Paulo"),
    ("SE", "Sergipe"),
    ("TO", "Tocantins"),
];

/// Company size codes.
pub const PORTE_OPTIONS: &[(&str, &str)] = &[
    ("00", "Não Informado"),
    ("01", "Micro Empresa"),
    ("03", "Empresa de Pequeno Porte"),
    ("05", "Demais"),
];

/// Registration status codes.
pub const SITUACAO_OPTIONS: &[(&str, &str)] = &[
    ("01", "Nula"),
    ("02", "Ativa"),
    ("03", "Suspensa"),
    ("04", "Inapta"),
    ("08", "Baixada"),
];

/// Headquarters or branch.
pub const TIPO_OPTIONS: &[(&str, &str)] = &[
    ("1", "Matriz"),
    ("2", "Filial"),
];

/// Two digit CNAE divisions, grouped by sector.
pub const CNAE_DIVISAO_OPTIONS: &[(&str, &str)] = &[
    ("10", "Alimentos"),
    ("11", "Bebidas"),
    ("13", "Têxteis"),
    ("14", "Confecção e vestuário"),
    ("15", "Couro e calçados"),
    ("16", "Madeira"),
    ("17", "Celulose e papel"),
    ("18", "Impressão e reprodução"),
    ("20", "Produtos químicos"),
    ("21", "Farmoquímicos"),
    ("22", "Borracha e plástico"),
    ("23", "Minerais não-metálicos"),
    ("24", "Metalurgia"),
    ("25", "Produtos de metal"),
    ("26", "Informática e eletrônicos"),
    ("27", "Máquinas elétricas"),
    ("28", "Máquinas e equipamentos"),
    ("29", "Veículos automotores"),
    ("30", "Outros equipamentos de transporte"),
    ("31", "Móveis"),
    ("32", "Produtos diversos"),
    ("33", "Manutenção de máquinas"),
    ("35", "Eletricidade e gás"),
    ("36", "Captação de água"),
    ("37", "Esgoto"),
    ("38", "Coleta de resíduos"),
    ("39", "Descontaminação"),
    ("41", "Construção de edifícios"),
    ("42", "Obras de infraestrutura"),
    ("43", "Serviços de construção"),
    ("45", "Comércio de veículos"),
    ("46", "Comércio atacadista"),
    ("47", "Comércio varejista"),
    ("49", "Transporte terrestre"),
    ("50", "Transporte aquaviário"),
    ("51", "Transporte aéreo"),
    ("52", "Armazenamento e auxiliar"),
    ("53", "Correio e outras entregas"),
    ("55", "Alojamento"),
    ("56", "Alimentação"),
    ("58", "Edição e edição integrada"),
    ("59", "Audiovisual"),
    ("60", "Rádio e televisão"),
    ("61", "Telecomunicações"),
    ("62", "Tecnologia da informação"),
    ("63", "Prestação de serviços de informação"),
    ("64", "Serviços financeiros"),
    ("65", "Seguros e previdência"),
    ("66", "Auxiliares financeiros"),
    ("68", "Atividades imobiliárias"),
    ("69", "Jurídicas e contabilidade"),
    ("70", "Sedes de empresas e consultoria"),
    ("71", "Arquitetura e engenharia"),
    ("72", "Pesquisa e desenvolvimento"),
    ("73", "Publicidade e pesquisa de mercado"),
    ("74", "Outras atividades profissionais"),
    ("75", "Veterinária"),
    ("77", "Aluguel de máquinas e objetos"),
    ("78", "Seleção e agenciamento de mão-de-obra"),
    ("79", "Agências de viagem"),
    ("80", "Vigilância e segurança"),
    ("81", "Serviços para edifícios e paisagismo"),
    ("82", "Serviços de escritório e apoio"),
    ("84", "Administração pública"),
    ("85", "Educação"),
    ("86", "Saúde humana"),
    ("87", "Assistência social com alojamento"),
    ("88", "Assistência social sem alojamento"),
    ("90", "Artes e cultura"),
    ("91", "Bibliotecas, museus"),
    ("92", "Jogos de azar"),
    ("93", "Esporte e recreação"),
    ("94", "Organizações associativas"),
    ("95", "Reparação de equipamentos"),
    ("96", "Serviços pessoais"),
    ("97", "Serviços domésticos"),
    ("99", "Organismos internacionais"),
];

/// Most common legal natures.
pub const NATUREZA_JURIDICA_OPTIONS: &[(&str, &str)] = &[
    ("2011", "Empresa Pública"),
    ("2038", "Sociedade de Economia Mista"),
    ("2046", "Sociedade Anônima Aberta"),
    ("2054", "Sociedade Anônima Fechada"),
    ("2062", "Sociedade Empresária Limitada"),
    ("2070", "Sociedade Empresária em Nome Coletivo"),
    ("2089", "Sociedade Empresária em Comandita Simples"),
    ("2097", "Sociedade Empresária em Comandita por Ações"),
    ("2127", "Sociedade Simples Pura"),
    ("2135", "Sociedade Simples Limitada"),
    ("2143", "Sociedade Simples em Nome Coletivo"),
    ("2151", "Sociedade Simples em Comandita Simples"),
    ("2160", "Empresa Individual de Responsabilidade Limitada (EIRELI)"),
    ("2305", "Empresa Individual Imobiliária"),
    ("2313", "Empresário (Individual)"),
    ("3034", "Serviço Notarial e Registral (Cartório)"),
    ("3069", "Fundação Privada"),
    ("3077", "Serviço Social Autônomo"),
    ("3085", "Condomínio Edilício"),
    ("3115", "Organização Religiosa"),
    ("3220", "Organização da Sociedade Civil"),
    ("3999", "Associação Privada"),
    ("4014", "Empresa Domiciliada no Exterior"),
    ("4120", "Cooperativa"),
    ("2232", "Microempreendedor Individual (MEI)"),
];

/// Area codes with their main city, grouped by state.
pub const DDD_OPTIONS: &[(&str, &str)] = &[
    ("11", "São Paulo (Capital e região)"),
    ("12", "São José dos Campos"),
    ("13", "Santos"),
    ("14", "Bauru"),
    ("15", "Sorocaba"),
    ("16", "Ribeirão Preto"),
    ("17", "São José do Rio Preto"),
    ("18", "Presidente Prudente"),
    ("19", "Campinas"),
    ("21", "Rio de Janeiro"),
    ("22", "Campos dos Goytacazes"),
    ("24", "Volta Redonda"),
    ("27", "Vitória"),
    ("28", "Cachoeiro de Itapemirim"),
    ("31", "Belo Horizonte"),
    ("32", "Juiz de Fora"),
    ("33", "Governador Valadares"),
    ("34", "Uberlândia"),
    ("35", "Poços de Caldas"),
    ("37", "Divinópolis"),
    ("38", "Montes Claros"),
    ("41", "Curitiba"),
    ("42", "Ponta Grossa"),
    ("43", "Londrina"),
    ("44", "Maringá"),
    ("45", "Foz do Iguaçu"),
    ("46", "Francisco Beltrão"),
    ("47", "Joinville"),
    ("48", "Florianópolis"),
    ("49", "Chapecó"),
    ("51", "Porto Alegre"),
    ("53", "Pelotas"),
    ("54", "Caxias do Sul"),
    ("55", "Santa Maria"),
    ("61", "Brasília"),
    ("62", "Goiânia"),
    ("64", "Rio Verde"),
    ("65", "Cuiabá"),
    ("66", "Rondonópolis"),
    ("67", "Campo Grande"),
    ("68", "Rio Branco"),
    ("69", "Porto Velho"),
    ("92", "Manaus"),
    ("97", "Manaus (interior)"),
    ("95", "Boa Vista"),
    ("96", "Macapá"),
    ("91", "Belém"),
    ("93", "Santarém"),
    ("94", "Marabá"),
    ("63", "Palmas"),
    ("98", "São Luís"),
    ("99", "Imperatriz"),
    ("86", "Teresina"),
    ("89", "Picos"),
    ("85", "Fortaleza"),
    ("88", "Juazeiro do Norte"),
    ("84", "Natal"),
    ("83", "João Pessoa"),
    ("81", "Recife"),
    ("87", "Petrolina"),
    ("82", "Maceió"),
    ("79", "Aracaju"),
    ("71", "Salvador"),
    ("73", "Ilhéus"),
    ("74", "Juazeiro"),
    ("75", "Feira de Santana"),
    ("77", "Barreiras"),
];

/// Upper bound of the share capital range.
pub const CAPITAL_SOCIAL_MAX: f64 = 999_999_999_999.0;

fn options(table: &[(&str, &str)]) -> Vec<FilterOption> {
    table
        .iter()
        .map(|(value, label)| FilterOption {
            value: value.to_string(),
            label: label.to_string(),
        })
        .collect()
}

fn select(table: &[(&str, &str)]) -> FilterDefinition {
    FilterDefinition {
        kind: FilterKind::SelectMultiple,
        options: Some(options(table)),
        min: None,
        max: None,
        presets: None,
    }
}

fn plain(kind: FilterKind) -> FilterDefinition {
    FilterDefinition {
        kind,
        options: None,
        min: None,
        max: None,
        presets: None,
    }
}

fn presets(table: &[(&str, Option<f64>, Option<f64>)]) -> Vec<RangePreset> {
    table
        .iter()
        .map(|(label, min, max)| RangePreset {
            label: label.to_string(),
            min: *min,
            max: *max,
        })
        .collect()
}

/// The full catalog. City and CNAE options are empty; clients load them
/// per state and per division.
pub fn catalog() -> FilterCatalog {
    let capital_social = FilterDefinition {
        min: Some(0.0),
        max: Some(CAPITAL_SOCIAL_MAX),
        presets: Some(presets(&[
            ("Até R$ 10 mil", Some(0.0), Some(10_000.0)),
            ("R$ 10 mil - R$ 50 mil", Some(10_000.0), Some(50_000.0)),
            ("R$ 50 mil - R$ 100 mil", Some(50_000.0), Some(100_000.0)),
            ("R$ 100 mil - R$ 500 mil", Some(100_000.0), Some(500_000.0)),
            ("R$ 500 mil - R$ 1 milhão", Some(500_000.0), Some(1_000_000.0)),
            ("Acima de R$ 1 milhão", Some(1_000_000.0), None),
        ])),
        ..plain(FilterKind::Range)
    };

    // Bounds are computed by the client from the current date.
    let data_abertura = FilterDefinition {
        presets: Some(presets(&[
            ("Último mês", None, None),
            ("Últimos 3 meses", None, None),
            ("Últimos 6 meses", None, None),
            ("Último ano", None, None),
            ("Últimos 2 anos", None, None),
            ("Últimos 5 anos", None, None),
        ])),
        ..plain(FilterKind::Range)
    };

    let idade_empresa = FilterDefinition {
        presets: Some(presets(&[
            ("Empresas novas (até 30 dias)", Some(0.0), Some(30.0)),
            ("Até 3 meses", Some(0.0), Some(90.0)),
            ("Até 6 meses", Some(0.0), Some(180.0)),
            ("Até 1 ano", Some(0.0), Some(365.0)),
            ("Até 2 anos", Some(0.0), Some(730.0)),
            ("Mais de 5 anos", Some(1825.0), None),
        ])),
        ..plain(FilterKind::Range)
    };

    FilterCatalog {
        termo: plain(FilterKind::Text),
        uf: select(UF_OPTIONS),
        municipio: select(&[]),
        cep_prefixo: plain(FilterKind::Text),
        ddd: select(DDD_OPTIONS),
        cnae_divisao: select(CNAE_DIVISAO_OPTIONS),
        cnae: select(&[]),
        porte: select(PORTE_OPTIONS),
        situacao: select(SITUACAO_OPTIONS),
        tipo: select(TIPO_OPTIONS),
        natureza_juridica: select(NATUREZA_JURIDICA_OPTIONS),
        capital_social,
        simples: plain(FilterKind::Boolean),
        mei: plain(FilterKind::Boolean),
        com_email: plain(FilterKind::Boolean),
        com_telefone: plain(FilterKind::Boolean),
        data_abertura,
        idade_empresa,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cnpj::location::STATE_TO_UF;

    #[test]
    fn every_state_is_listed() {
        assert_eq!(UF_OPTIONS.len(), 27);
        for (_, uf) in STATE_TO_UF {
            assert!(UF_OPTIONS.iter().any(|(value, _)| value == uf), "{uf} missing");
        }
    }

    #[test]
    fn catalog_serializes_kinds() {
        let json = serde_json::to_value(catalog()).expect("catalog serializes");
        assert_eq!(json["uf"]["type"], "select_multiple");
        assert_eq!(json["termo"]["type"], "text");
        assert_eq!(json["mei"]["type"], "boolean");
        assert_eq!(json["capital_social"]["type"], "range");
        assert!(json["termo"].get("options").is_none());
        assert_eq!(json["municipio"]["options"], serde_json::json!([]));
        assert_eq!(json["idade_empresa"]["presets"][5]["max"], serde_json::Value::Null);
        assert_eq!(json["idade_empresa"]["presets"][5]["min"], 1825.0);
    }

    #[test]
    fn option_values_are_unique() {
        for table in [DDD_OPTIONS, CNAE_DIVISAO_OPTIONS, NATUREZA_JURIDICA_OPTIONS] {
            let mut values: Vec<_> = table.iter().map(|(value, _)| *value).collect();
            values.sort_unstable();
            values.dedup();
            assert_eq!(values.len(), table.len());
        }
    }
}
