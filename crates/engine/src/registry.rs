//! Static catalogue of the published fact tables.
//!
//! Every table declares its physical name, the curated dimensions that may be
//! filtered and grouped on, and the measure column that gets summed. Columns
//! that exist physically but are not declared here (surrogate ids) are never
//! exposed.

use crimestat_contracts::{DimensionSummary, TableSummary};

use crate::error::EngineError;

pub const MEASURE: &str = "kisi_sayisi";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Integer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimension {
    /// Public key used in URLs, filters and output rows.
    pub key: &'static str,
    /// Physical column name.
    pub column: &'static str,
    pub column_type: ColumnType,
    /// Integer id column stored alongside a text label, e.g. `il_id` for `il`.
    pub id_column: Option<&'static str>,
}

impl Dimension {
    pub const fn text(key: &'static str) -> Self {
        Self {
            key,
            column: key,
            column_type: ColumnType::Text,
            id_column: None,
        }
    }

    pub const fn integer(key: &'static str) -> Self {
        Self {
            key,
            column: key,
            column_type: ColumnType::Integer,
            id_column: None,
        }
    }

    pub const fn with_id(self, id_column: &'static str) -> Self {
        Self {
            id_column: Some(id_column),
            ..self
        }
    }

    pub const fn stored_as(self, column: &'static str) -> Self {
        Self { column, ..self }
    }

    pub fn display_name(&self) -> String {
        display_name(self.key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FactTable {
    pub id: &'static str,
    pub table: &'static str,
    pub display_name: &'static str,
    pub dimensions: &'static [Dimension],
    pub measure: &'static str,
    /// Dimension the projected rows are sorted by, usually the year.
    pub ordering: Option<&'static str>,
}

impl FactTable {
    pub fn dimension(&self, key: &str) -> Option<&'static Dimension> {
        self.dimensions.iter().find(|d| d.key == key)
    }

    pub fn require_dimension(&self, key: &str) -> Result<&'static Dimension, EngineError> {
        self.dimension(key)
            .ok_or_else(|| EngineError::UnknownDimension {
                table: self.id,
                dimension: key.to_string(),
            })
    }

    pub fn summary(&self) -> TableSummary {
        TableSummary {
            id: self.id.to_string(),
            display_name: self.display_name.to_string(),
        }
    }

    pub fn dimension_summaries(&self) -> Vec<DimensionSummary> {
        self.dimensions
            .iter()
            .map(|d| DimensionSummary {
                key: d.key.to_string(),
                display_name: d.display_name(),
            })
            .collect()
    }

    /// Every physical column the table must provide.
    pub fn required_columns(&self) -> Vec<&'static str> {
        let mut columns = Vec::with_capacity(self.dimensions.len() * 2 + 1);
        for dimension in self.dimensions {
            columns.push(dimension.column);
            if let Some(id_column) = dimension.id_column {
                columns.push(id_column);
            }
        }
        columns.push(self.measure);
        columns
    }
}

const YIL: Dimension = Dimension::integer("yil");
const YAS: Dimension = Dimension::integer("yas");
const CINSIYET: Dimension = Dimension::text("cinsiyet");
const IL: Dimension = Dimension::text("il").with_id("il_id");
const SUC_TURU: Dimension = Dimension::text("suc_turu").with_id("suc_turu_id");
const CEZA_TURU: Dimension = Dimension::text("ceza_turu").with_id("ceza_turu_id");
const EGITIM_DURUMU: Dimension = Dimension::text("egitim_durumu").with_id("egitim_durumu_id");
const INFAZA_DAVET_SEKLI: Dimension =
    Dimension::text("infaza_davet_sekli").with_id("infaza_davet_id");
const IS_DURUMU: Dimension = Dimension::text("is_durumu").with_id("is_durumu_id");
const MEDENI_DURUM: Dimension = Dimension::text("medeni_durum").with_id("medeni_durum_id");
const UYRUK: Dimension = Dimension::text("uyruk");
const YERLESIM_YERI_ULKE: Dimension = Dimension::text("yerlesim_yeri_ulke");
const YERLESIM_YERI: Dimension = Dimension::text("yerlesim_yeri").with_id("yerlesim_yeri_id");

static TABLES: &[FactTable] = &[
    FactTable {
        id: "ceza_turu",
        table: "ceza_turu",
        display_name: "Ceza Türü",
        dimensions: &[CEZA_TURU, CINSIYET, YIL],
        measure: MEASURE,
        ordering: Some("yil"),
    },
    FactTable {
        id: "egitim_durumu",
        table: "egitim_durumu",
        display_name: "Eğitim Durumu",
        dimensions: &[SUC_TURU, EGITIM_DURUMU, CINSIYET, IL, YIL],
        measure: MEASURE,
        ordering: Some("yil"),
    },
    FactTable {
        id: "il_kisi_sayisi",
        table: "il_ve_kisi_sayisi",
        display_name: "İl ve Kişi Sayısı",
        dimensions: &[IL, YIL],
        measure: MEASURE,
        ordering: Some("yil"),
    },
    FactTable {
        id: "infaz_davet",
        table: "infaza_davet_sekli",
        display_name: "İnfaza Davet Şekli",
        dimensions: &[SUC_TURU, INFAZA_DAVET_SEKLI, CINSIYET, YIL],
        measure: MEASURE,
        ordering: Some("yil"),
    },
    FactTable {
        id: "is_durumu",
        table: "is_durumu",
        display_name: "İş Durumu",
        dimensions: &[SUC_TURU, IS_DURUMU, CINSIYET, IL, YIL],
        measure: MEASURE,
        ordering: Some("yil"),
    },
    FactTable {
        id: "medeni_durum",
        table: "medeni_durum",
        display_name: "Medeni Durum",
        dimensions: &[SUC_TURU, MEDENI_DURUM, CINSIYET, IL],
        measure: MEASURE,
        ordering: None,
    },
    FactTable {
        id: "suc_turu_genel",
        table: "suc_turu_genel",
        display_name: "Suç Türü Genel",
        dimensions: &[SUC_TURU, IL, YIL],
        measure: MEASURE,
        ordering: Some("yil"),
    },
    FactTable {
        id: "uyruk_cinsiyet",
        table: "uyruk_ve_cinsiyet",
        display_name: "Uyruk ve Cinsiyet",
        dimensions: &[UYRUK, CINSIYET, IL, YIL],
        measure: MEASURE,
        ordering: Some("yil"),
    },
    FactTable {
        id: "yerlesim_yeri",
        table: "yerlesim_yeri",
        display_name: "Yerleşim Yeri",
        dimensions: &[YERLESIM_YERI_ULKE, CINSIYET, YERLESIM_YERI, YIL],
        measure: MEASURE,
        ordering: Some("yil"),
    },
    FactTable {
        id: "yas",
        table: "yas",
        display_name: "Yaş",
        dimensions: &[YAS, CINSIYET, IL, YIL],
        measure: MEASURE,
        ordering: Some("yil"),
    },
];

pub fn tables() -> &'static [FactTable] {
    TABLES
}

pub fn resolve(id: &str) -> Result<&'static FactTable, EngineError> {
    TABLES
        .iter()
        .find(|t| t.id == id)
        .ok_or_else(|| EngineError::UnknownTable(id.to_string()))
}

pub fn dimensions_of(id: &str) -> Result<&'static [Dimension], EngineError> {
    Ok(resolve(id)?.dimensions)
}

const DISPLAY_NAMES: &[(&str, &str)] = &[
    ("yas", "Yaş"),
    ("yil", "Yıl"),
    ("ceza_turu", "Ceza Türü"),
    ("suc_turu", "Suç Türü"),
    ("egitim_durumu", "Eğitim Durumu"),
    ("is_durumu", "İş Durumu"),
    ("medeni_durum", "Medeni Durum"),
    ("infaza_davet_sekli", "İnfaza Davet Şekli"),
    ("yerlesim_yeri", "Yerleşim Yeri"),
    ("yerlesim_yeri_ulke", "Yerleşim Yeri (Ülke)"),
    ("cinsiyet", "Cinsiyet"),
    ("il", "İl"),
    ("uyruk", "Uyruk"),
    ("kisi_sayisi", "Kişi Sayısı"),
];

/// Human label for a column key. Unmapped keys are split on separators and
/// title-cased.
pub fn display_name(key: &str) -> String {
    if let Some((_, label)) = DISPLAY_NAMES.iter().find(|(k, _)| *k == key) {
        return label.to_string();
    }

    key.split(['_', '-'])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
