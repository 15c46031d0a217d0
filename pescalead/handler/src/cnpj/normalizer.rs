//! Conversion of raw registry rows into API records.

use crate::api::models::cnpj::{
    Atividade, CnpjRecord, Contato, Endereco, SearchResultItem, Simples, Socio,
};
use crate::database::cnpj::{CnpjParts, RawCompany, RawPartner, RawSimples, SearchRow};

/// Registration status for a code. Unknown codes are reported as such.
pub fn decode_situacao_cadastral(code: Option<&str>) -> Option<String> {
    let code = code.filter(|c| !c.is_empty())?;
    let label = match code {
        "01" => "Nula",
        "02" => "Ativa",
        "03" => "Suspensa",
        "04" => "Inapta",
        "08" => "Baixada",
        other => return Some(format!("Código {other}")),
    };
    Some(label.to_string())
}

/// Company size for a code. Unknown codes are reported as such.
pub fn decode_porte(code: Option<&str>) -> Option<String> {
    let code = code.filter(|c| !c.is_empty())?;
    let label = match code {
        "00" => "Não Informado",
        "01" => "Micro Empresa",
        "03" => "Empresa de Pequeno Porte",
        "05" => "Demais",
        other => return Some(format!("Código {other}")),
    };
    Some(label.to_string())
}

/// Age bracket of a partner.
pub fn decode_faixa_etaria(code: Option<&str>) -> Option<String> {
    let label = match code? {
        "0" => "Não se aplica",
        "1" => "0-12 anos",
        "2" => "13-20 anos",
        "3" => "21-30 anos",
        "4" => "31-40 anos",
        "5" => "41-50 anos",
        "6" => "51-60 anos",
        "7" => "61-70 anos",
        "8" => "71-80 anos",
        "9" => "Maior de 80 anos",
        _ => return None,
    };
    Some(label.to_string())
}

fn digits(text: &str) -> String {
    text.chars().filter(char::is_ascii_digit).collect()
}

fn phone_parts(ddd: Option<&str>, number: Option<&str>) -> Option<(String, String)> {
    let ddd = digits(ddd?);
    let number = digits(number?);
    if ddd.is_empty() || number.is_empty() {
        return None;
    }
    Some((ddd, number))
}

/// `(DD) NNNNN-NNNN` for mobiles, `(DD) NNNN-NNNN` for landlines.
pub fn format_phone(ddd: Option<&str>, number: Option<&str>) -> Option<String> {
    let (ddd, number) = phone_parts(ddd, number)?;
    let formatted = match number.len() {
        9 => format!("({ddd}) {}-{}", &number[..5], &number[5..]),
        8 => format!("({ddd}) {}-{}", &number[..4], &number[4..]),
        _ => format!("({ddd}) {number}"),
    };
    Some(formatted)
}

/// Area code and number, digits only.
pub fn format_phone_clean(ddd: Option<&str>, number: Option<&str>) -> Option<String> {
    phone_parts(ddd, number).map(|(ddd, number)| format!("{ddd}{number}"))
}

/// Registry dates are `YYYYMMDD`; dates already dashed lose any time part.
pub fn format_date(date: Option<&str>) -> Option<String> {
    let date = date.filter(|d| !d.is_empty())?;
    if date.contains('-') {
        return date.split('T').next().map(str::to_string);
    }
    if date.len() == 8 && date.chars().all(|c| c.is_ascii_digit()) {
        return Some(format!("{}-{}-{}", &date[..4], &date[4..6], &date[6..]));
    }
    Some(date.to_string())
}

/// Share capital as a number. Accepts `900.00`, `900,00` and `1.500,00`.
pub fn format_capital_social(value: Option<&str>) -> Option<f64> {
    let value = value?.trim();
    let parsed = match (value.contains('.'), value.contains(',')) {
        (true, true) => value.replace('.', "").replacen(',', ".", 1).parse::<f64>(),
        (false, true) => value.replacen(',', ".", 1).parse::<f64>(),
        _ => value.parse::<f64>(),
    };
    parsed.ok().filter(|n| !n.is_nan())
}

/// Digits of a CNPJ, formatting removed.
pub fn normalize_cnpj(cnpj: &str) -> String {
    digits(cnpj)
}

/// Format check only: 14 digits, not all the same. Check digits are not
/// verified.
pub fn is_valid_cnpj(cnpj: &str) -> bool {
    let cleaned = normalize_cnpj(cnpj);
    let mut chars = cleaned.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    cleaned.len() == 14 && !chars.all(|c| c == first)
}

/// Split a CNPJ into basico, ordem and dv.
pub fn parse_cnpj(cnpj: &str) -> CnpjParts {
    let cleaned = normalize_cnpj(cnpj);
    let part = |from: usize, to: usize| cleaned.get(from..to.min(cleaned.len())).unwrap_or_default();
    CnpjParts {
        basico: part(0, 8).to_string(),
        ordem: part(8, 12).to_string(),
        dv: part(12, 14).to_string(),
    }
}

fn trimmed(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn present(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

fn tipo(code: Option<&str>) -> Option<String> {
    match code? {
        "1" => Some("MATRIZ".to_string()),
        "2" => Some("FILIAL".to_string()),
        _ => None,
    }
}

/// Tax regime of a company.
pub fn normalize_simples(raw: &RawSimples) -> Simples {
    Simples {
        opcao_simples: raw.opcao_pelo_simples.as_deref() == Some("S"),
        data_opcao_simples: format_date(raw.data_opcao_simples.as_deref()),
        data_exclusao_simples: format_date(raw.data_exclusao_simples.as_deref()),
        opcao_mei: raw.opcao_mei.as_deref() == Some("S"),
        data_opcao_mei: format_date(raw.data_opcao_mei.as_deref()),
        data_exclusao_mei: format_date(raw.data_exclusao_mei.as_deref()),
    }
}

/// A partner of a company.
pub fn normalize_partner(raw: &RawPartner) -> Socio {
    Socio {
        nome: trimmed(raw.nome_socio_razao_social.as_deref()),
        cpf_cnpj: present(raw.cpf_cnpj_socio.as_deref()),
        qualificacao: trimmed(raw.qualificacao_descricao.as_deref()),
        qualificacao_codigo: present(raw.qualificacao_socio.as_deref()),
        data_entrada: format_date(raw.data_entrada_sociedade.as_deref()),
        faixa_etaria: decode_faixa_etaria(raw.faixa_etaria.as_deref()),
        pais: present(raw.pais.as_deref()),
        representante_legal: present(raw.representante_legal.as_deref()),
        nome_representante: trimmed(raw.nome_do_representante.as_deref()),
    }
}

/// Build the API record of an establishment. Partners are only attached
/// when given.
pub fn normalize_record(raw: &RawCompany, socios: Option<&[RawPartner]>) -> CnpjRecord {
    let basico = raw.cnpj_basico.clone().unwrap_or_default();
    let ordem = raw.cnpj_ordem.clone().unwrap_or_default();
    let dv = raw.cnpj_dv.clone().unwrap_or_default();

    let endereco = Endereco {
        tipo_logradouro: trimmed(raw.tipo_logradouro.as_deref()),
        logradouro: trimmed(raw.logradouro.as_deref()),
        numero: trimmed(raw.numero.as_deref()),
        complemento: trimmed(raw.complemento.as_deref()),
        bairro: trimmed(raw.bairro.as_deref()),
        municipio: trimmed(raw.municipio_nome.as_deref()),
        municipio_codigo: present(raw.municipio_codigo.as_deref()),
        uf: trimmed(raw.uf.as_deref()),
        cep: raw.cep.as_deref().map(digits).filter(|c| !c.is_empty()),
    };

    let contato = Contato {
        email: raw
            .correio_eletronico
            .as_deref()
            .map(|e| e.to_lowercase())
            .and_then(|e| trimmed(Some(&e))),
        telefone_1: format_phone_clean(raw.ddd_1.as_deref(), raw.telefone_1.as_deref()),
        telefone_1_formatted: format_phone(raw.ddd_1.as_deref(), raw.telefone_1.as_deref()),
        telefone_2: format_phone_clean(raw.ddd_2.as_deref(), raw.telefone_2.as_deref()),
        telefone_2_formatted: format_phone(raw.ddd_2.as_deref(), raw.telefone_2.as_deref()),
        fax: format_phone_clean(raw.ddd_fax.as_deref(), raw.fax.as_deref()),
    };

    let atividade = Atividade {
        cnae_principal: present(raw.cnae_fiscal_principal.as_deref()),
        cnae_descricao: trimmed(raw.cnae_descricao.as_deref()),
    };

    let simples = normalize_simples(&RawSimples {
        opcao_pelo_simples: raw.opcao_pelo_simples.clone(),
        data_opcao_simples: raw.data_opcao_simples.clone(),
        data_exclusao_simples: raw.data_exclusao_simples.clone(),
        opcao_mei: raw.opcao_mei.clone(),
        data_opcao_mei: raw.data_opcao_mei.clone(),
        data_exclusao_mei: raw.data_exclusao_mei.clone(),
    });

    CnpjRecord {
        cnpj: format!("{basico}{ordem}{dv}"),
        cnpj_basico: basico,
        cnpj_ordem: ordem,
        cnpj_dv: dv,
        razao_social: trimmed(raw.razao_social.as_deref()),
        nome_fantasia: trimmed(raw.nome_fantasia.as_deref()),
        porte: decode_porte(raw.porte_empresa.as_deref()),
        porte_codigo: present(raw.porte_empresa.as_deref()),
        natureza_juridica: trimmed(raw.natureza_juridica_descricao.as_deref()),
        natureza_juridica_codigo: present(raw.natureza_juridica.as_deref()),
        situacao_cadastral: decode_situacao_cadastral(raw.situacao_cadastral.as_deref()),
        situacao_cadastral_codigo: present(raw.situacao_cadastral.as_deref()),
        data_situacao_cadastral: format_date(raw.data_situacao_cadastral.as_deref()),
        data_inicio_atividade: format_date(raw.data_inicio_atividade.as_deref()),
        tipo: tipo(raw.identificador_matriz_filial.as_deref()),
        capital_social: format_capital_social(raw.capital_social.as_deref()),
        endereco,
        contato,
        atividade,
        simples,
        socios: socios.map(|s| s.iter().map(normalize_partner).collect()),
    }
}

fn yes_no(flag: Option<&str>) -> Option<bool> {
    match flag? {
        "S" => Some(true),
        "N" => Some(false),
        _ => None,
    }
}

/// Convert a search row. The phone column holds the area code followed by
/// the number.
pub fn normalize_search_row(row: &SearchRow) -> SearchResultItem {
    let telefone = row.telefone.as_deref().and_then(|phone| {
        let split = phone.char_indices().nth(2).map_or(phone.len(), |(i, _)| i);
        let (ddd, number) = phone.split_at(split);
        format_phone_clean(Some(ddd), Some(number))
    });

    SearchResultItem {
        cnpj: row.cnpj.clone().unwrap_or_default(),
        razao_social: trimmed(row.razao_social.as_deref()),
        nome_fantasia: trimmed(row.nome_fantasia.as_deref()),
        email: row
            .email
            .as_deref()
            .map(|e| e.to_lowercase())
            .and_then(|e| trimmed(Some(&e))),
        telefone,
        uf: trimmed(row.uf.as_deref()),
        municipio: trimmed(row.municipio.as_deref()),
        cnae: present(row.cnae.as_deref()),
        cnae_descricao: trimmed(row.cnae_descricao.as_deref()),
        porte: decode_porte(row.porte.as_deref()),
        capital_social: format_capital_social(row.capital_social.as_deref()),
        situacao: decode_situacao_cadastral(row.situacao.as_deref()),
        data_abertura: format_date(row.data_abertura.as_deref()),
        tipo: tipo(row.tipo.as_deref()),
        simples: yes_no(row.simples.as_deref()),
        mei: yes_no(row.mei.as_deref()),
    }
}
