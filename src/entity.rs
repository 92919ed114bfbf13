//! The six canonical entities of the evaluation star schema.
//!
//! Each [`Entity`] knows its final table, its staging area, the fixed column
//! contract used by the direct-insert path, and (for dimensions) its key and
//! the label written into curated placeholder rows.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Canonical column names shared by the final tables.
pub mod column {
    pub const COURSE_CODE: &str = "Cod_Curso";
    pub const COURSE_NAME: &str = "Curso";
    pub const COURSE_SECTOR: &str = "Setor_Curso";

    pub const DISCIPLINE_CODE: &str = "Cod_Disciplina";
    pub const DISCIPLINE_NAME: &str = "Nome_Disciplina";
    pub const DEPARTMENT: &str = "Departamento";
    pub const INSTRUCTOR_CODE: &str = "Cod_Prof";
    pub const MODALITY: &str = "Modalidade";

    pub const QUESTION_ID: &str = "ID_Pergunta";
    pub const QUESTION_ORDER: &str = "Ordem";
    pub const QUESTION_TYPE: &str = "TipoPergunta";
    pub const QUESTION_TEXT: &str = "Pergunta";

    pub const QUESTION_GROUP: &str = "GrupoDePergunta";

    pub const UNIT_CODE: &str = "SiglaLotação";
    pub const MANAGING_UNIT: &str = "UnidadeGestora";
    pub const LOCATION: &str = "Lotação";

    pub const SURVEY_ID: &str = "ID_Pesquisa";
    pub const RESPONSE: &str = "Resposta";
    pub const YEAR: &str = "Ano";

    pub const EVALUATION_ID: &str = "id_avaliacao";
    pub const RESPONSE_CATEGORY: &str = "Resposta_Padronizada";
    pub const RESPONSE_VALUE: &str = "Valor_Resposta";
}

pub const STAGING_PREFIX: &str = "stg_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Entity {
    Course,
    Discipline,
    Question,
    QuestionType,
    Unit,
    Evaluation,
}

impl Entity {
    /// Contract order of the direct-insert workbook sheets.
    pub const ALL: [Entity; 6] = [
        Entity::Course,
        Entity::Discipline,
        Entity::Question,
        Entity::QuestionType,
        Entity::Unit,
        Entity::Evaluation,
    ];

    pub fn table(self) -> &'static str {
        match self {
            Entity::Course => "dCurso",
            Entity::Discipline => "dDisciplina",
            Entity::Question => "dPergunta",
            Entity::QuestionType => "dTipoPergunta",
            Entity::Unit => "dUnidade",
            Entity::Evaluation => "fAvaliacao",
        }
    }

    pub fn staging_table(self) -> String {
        format!("{STAGING_PREFIX}{}", self.table())
    }

    pub fn from_table(name: &str) -> Option<Entity> {
        Entity::ALL.into_iter().find(|entity| entity.table() == name)
    }

    pub fn required_columns(self) -> &'static [&'static str] {
        use column::*;
        match self {
            Entity::Course => &[COURSE_CODE, COURSE_NAME, COURSE_SECTOR],
            Entity::Discipline => &[
                DISCIPLINE_CODE,
                DISCIPLINE_NAME,
                COURSE_CODE,
                DEPARTMENT,
                INSTRUCTOR_CODE,
                MODALITY,
            ],
            Entity::Question => &[QUESTION_ID, QUESTION_ORDER, QUESTION_TYPE, QUESTION_TEXT],
            Entity::QuestionType => &[QUESTION_TYPE, QUESTION_GROUP],
            Entity::Unit => &[UNIT_CODE, MANAGING_UNIT, LOCATION],
            Entity::Evaluation => &[
                SURVEY_ID,
                QUESTION_ID,
                RESPONSE,
                DISCIPLINE_CODE,
                COURSE_CODE,
                QUESTION_TYPE,
                UNIT_CODE,
                YEAR,
            ],
        }
    }

    /// Business key of a dimension; the fact table has none.
    pub fn key_column(self) -> Option<&'static str> {
        match self {
            Entity::Course => Some(column::COURSE_CODE),
            Entity::Discipline => Some(column::DISCIPLINE_CODE),
            Entity::Question => Some(column::QUESTION_ID),
            Entity::QuestionType => Some(column::QUESTION_TYPE),
            Entity::Unit => Some(column::UNIT_CODE),
            Entity::Evaluation => None,
        }
    }

    /// Column that receives the human-readable marker of a curated placeholder.
    pub fn label_column(self) -> Option<&'static str> {
        match self {
            Entity::Course => Some(column::COURSE_NAME),
            Entity::Discipline => Some(column::DISCIPLINE_NAME),
            Entity::Question => Some(column::QUESTION_TEXT),
            Entity::QuestionType => Some(column::QUESTION_GROUP),
            Entity::Unit => Some(column::MANAGING_UNIT),
            Entity::Evaluation => None,
        }
    }

    pub fn placeholder_label(self, key: &str) -> String {
        let marker = match self {
            Entity::Course => "Curso Não Identificado",
            Entity::Discipline => "Disciplina Não Identificada",
            Entity::Question => "Pergunta Não Cadastrada",
            Entity::QuestionType => "Tipo de Pergunta Não Identificado",
            Entity::Unit => "Unidade Não Identificada",
            Entity::Evaluation => "Avaliação Não Identificada",
        };
        format!("{marker} ({key})")
    }

    pub fn is_dimension(self) -> bool {
        self != Entity::Evaluation
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}
