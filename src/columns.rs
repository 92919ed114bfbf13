//! Column normalization for raw sheet headers.
//!
//! Headers are trimmed and looked up in a fixed alias table. Lookup goes
//! through a fold key (accents folded, then snake_case) so spelling variants
//! such as `Cod Curso`, `COD_CURSO` and `CodCurso` meet on the same entry.
//! Headers the table does not know pass through trimmed.

use std::collections::{HashMap, HashSet};

use heck::ToSnakeCase;

use crate::{entity::Entity, workbook::Sheet};

/// Known spelling variants, `(variant, canonical)`.
const BUILTIN_ALIASES: &[(&str, &str)] = &[
    ("Código Curso", "Cod_Curso"),
    ("Código do Curso", "Cod_Curso"),
    ("Cd_Curso", "Cod_Curso"),
    ("Nome Curso", "Curso"),
    ("Nome do Curso", "Curso"),
    ("Setor", "Setor_Curso"),
    ("Setor do Curso", "Setor_Curso"),
    ("Código Disciplina", "Cod_Disciplina"),
    ("Código da Disciplina", "Cod_Disciplina"),
    ("Cd_Disciplina", "Cod_Disciplina"),
    ("Disciplina", "Nome_Disciplina"),
    ("Nome da Disciplina", "Nome_Disciplina"),
    ("Depto", "Departamento"),
    ("Cod_Professor", "Cod_Prof"),
    ("Código Professor", "Cod_Prof"),
    ("Modalidade de Ensino", "Modalidade"),
    ("Id Questão", "ID_Pergunta"),
    ("Cod_Pergunta", "ID_Pergunta"),
    ("Código Pergunta", "ID_Pergunta"),
    ("Ordem Pergunta", "Ordem"),
    ("Tipo", "TipoPergunta"),
    ("Tipo de Pergunta", "TipoPergunta"),
    ("Texto Pergunta", "Pergunta"),
    ("Texto da Pergunta", "Pergunta"),
    ("Questão", "Pergunta"),
    ("Grupo Pergunta", "GrupoDePergunta"),
    ("Grupo", "GrupoDePergunta"),
    ("Eixo", "GrupoDePergunta"),
    ("Sigla", "SiglaLotação"),
    ("Sigla Unidade", "SiglaLotação"),
    ("Unidade", "UnidadeGestora"),
    ("Nome Lotação", "Lotação"),
    ("Pesquisa", "ID_Pesquisa"),
    ("Cod_Pesquisa", "ID_Pesquisa"),
    ("Texto Resposta", "Resposta"),
    ("Ano Avaliação", "Ano"),
    ("Ano_Referencia", "Ano"),
];

#[derive(Debug, Clone)]
pub struct ColumnNormalizer {
    aliases: HashMap<String, String>,
}

impl Default for ColumnNormalizer {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ColumnNormalizer {
    /// Canonical names of every entity plus the built-in variant table.
    pub fn builtin() -> Self {
        let mut aliases = HashMap::new();
        for entity in Entity::ALL {
            for canonical in entity.required_columns() {
                aliases.insert(fold_key(canonical), canonical.to_string());
            }
        }
        for (variant, canonical) in BUILTIN_ALIASES {
            aliases.insert(fold_key(variant), canonical.to_string());
        }
        Self { aliases }
    }

    /// Adds aliases on top of the built-in table; later entries win.
    pub fn with_aliases<I, K, V>(mut self, extra: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (variant, canonical) in extra {
            self.aliases.insert(fold_key(variant.as_ref()), canonical.into());
        }
        self
    }

    pub fn canonical_name(&self, raw: &str) -> String {
        let trimmed = raw.trim();
        self.aliases
            .get(&fold_key(trimmed))
            .cloned()
            .unwrap_or_else(|| trimmed.to_string())
    }

    /// Canonicalizes a header row. Names that collide after normalization are
    /// suffixed `.1`, `.2`, ... in order of appearance, skipping any suffixed
    /// name the row already uses.
    pub fn normalize_headers(&self, headers: &[String]) -> Vec<String> {
        let mut emitted: HashSet<String> = HashSet::new();
        let mut suffixes: HashMap<String, usize> = HashMap::new();
        let mut normalized = Vec::with_capacity(headers.len());
        for raw in headers {
            let name = self.canonical_name(raw);
            let base = name.to_ascii_lowercase();
            let mut candidate = name.clone();
            if emitted.contains(&base) {
                let next = suffixes.entry(base).or_insert(0);
                loop {
                    *next += 1;
                    candidate = format!("{name}.{next}");
                    if !emitted.contains(&candidate.to_ascii_lowercase()) {
                        break;
                    }
                }
            }
            emitted.insert(candidate.to_ascii_lowercase());
            normalized.push(candidate);
        }
        normalized
    }

    pub fn normalize_sheet(&self, mut sheet: Sheet) -> Sheet {
        sheet.headers = self.normalize_headers(&sheet.headers);
        sheet
    }
}

/// Lookup key: accents folded, then snake_case, so case, spacing and
/// underscores do not matter.
pub fn fold_key(name: &str) -> String {
    fold_accents(name.trim()).to_snake_case()
}

fn fold_accents(value: &str) -> String {
    value
        .chars()
        .map(|ch| match ch {
            'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
            'Á' | 'À' | 'Â' | 'Ã' | 'Ä' => 'A',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'É' | 'È' | 'Ê' | 'Ë' => 'E',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
            'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'O',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
            'ç' => 'c',
            'Ç' => 'C',
            other => other,
        })
        .collect()
}
