// src/models/layout.rs

//! Page layout description used by the record extractor.
//!
//! A layout is configuration data: a list of named single-value fields and a
//! list of repeating sections, each addressed by a CSS selector and an
//! optional label. The default layout targets the OSHA establishment
//! inspection detail page.

use serde::{Deserialize, Serialize};

/// Full description of one page layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageLayout {
    /// Selector that must match once the page content is present
    #[serde(default = "defaults::ready_selector")]
    pub ready_selector: String,

    /// Single-value fields in output order
    #[serde(default = "defaults::fields")]
    pub fields: Vec<FieldSpec>,

    /// Repeating sections, extracted after the fields
    #[serde(default = "defaults::sections")]
    pub sections: Vec<SectionSpec>,
}

impl Default for PageLayout {
    fn default() -> Self {
        Self {
            ready_selector: defaults::ready_selector(),
            fields: defaults::fields(),
            sections: defaults::sections(),
        }
    }
}

/// One named field and the path used to find it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Output field name
    pub name: String,

    /// CSS selector for candidate elements
    pub selector: String,

    /// Label text the candidate must carry (its first `strong` descendant)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Match `label` as a prefix instead of exactly
    #[serde(default)]
    pub label_prefix: bool,

    /// Join multi-line text with ", "
    #[serde(default)]
    pub join_lines: bool,

    /// Drop everything up to the first ":" in the text
    #[serde(default = "defaults::strip_label")]
    pub strip_label: bool,
}

impl FieldSpec {
    /// Field located by selector alone.
    pub fn new(name: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            selector: selector.into(),
            label: None,
            label_prefix: false,
            join_lines: false,
            strip_label: defaults::strip_label(),
        }
    }

    /// Field located by selector and label; the label doubles as the name.
    pub fn labeled(selector: impl Into<String>, label: impl Into<String>) -> Self {
        let label = label.into();
        Self {
            label: Some(label.clone()),
            ..Self::new(label, selector)
        }
    }

    pub fn joined(mut self) -> Self {
        self.join_lines = true;
        self
    }

    pub fn prefix(mut self) -> Self {
        self.label_prefix = true;
        self
    }

    /// Human readable lookup path, used in warnings.
    pub fn path(&self) -> String {
        match &self.label {
            Some(label) => format!("{}[{}]", self.selector, label),
            None => self.selector.clone(),
        }
    }
}

/// How rows of a section are turned into field names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    /// Table rows keyed by their 1-based position
    Indexed,
    /// Table rows keyed by the text of the row's `th` cell
    Labeled,
    /// Heading followed by "Key: Value" blocks and a long paragraph
    Narrative,
}

/// A repeating, table-like part of the page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionSpec {
    /// Section name, available as `{section}` in the key template
    pub name: String,

    pub kind: SectionKind,

    /// Selector for the container (`table`) or heading (`h4`)
    pub selector: String,

    /// Table caption, or heading label for narrative sections
    pub label: String,

    /// Column names in cell order
    #[serde(default)]
    pub columns: Vec<String>,

    /// Field name template; supports `{section}`, `{index}`, `{label}`, `{column}`
    #[serde(default = "defaults::key_template")]
    pub key_template: String,
}

impl SectionSpec {
    fn table(
        kind: SectionKind,
        caption: &str,
        key_template: &str,
        columns: &[&str],
    ) -> Self {
        Self {
            name: caption.to_string(),
            kind,
            selector: "table".to_string(),
            label: caption.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            key_template: key_template.to_string(),
        }
    }

    /// Build the output field name for one cell.
    pub fn key(&self, index: usize, label: &str, column: &str) -> String {
        self.key_template
            .replace("{section}", &self.name)
            .replace("{index}", &index.to_string())
            .replace("{label}", label)
            .replace("{column}", column)
    }
}

mod defaults {
    use super::{FieldSpec, SectionKind, SectionSpec};

    pub fn ready_selector() -> String {
        "div.row-fluid".into()
    }

    pub fn strip_label() -> bool {
        true
    }

    pub fn key_template() -> String {
        "{section} {index} {column}".into()
    }

    pub fn fields() -> Vec<FieldSpec> {
        let mut fields = vec![
            FieldSpec {
                name: "Inspection Office".into(),
                ..FieldSpec::labeled("p > strong", "Inspection Information - Office").prefix()
            },
            FieldSpec::labeled("div.span4", "Inspection Nr"),
            FieldSpec::labeled("div.span4", "Report ID"),
            FieldSpec::labeled("div.span4", "Date Opened"),
            FieldSpec::new("Case Status", "div.well.well-small"),
            FieldSpec::labeled("p", "Site Address").joined(),
            FieldSpec::labeled("p", "Mailing Address").joined(),
            FieldSpec::labeled("div.span4", "Union Status"),
        ];

        fields.extend(
            [
                "SIC",
                "NAICS",
                "Inspection Type",
                "Scope",
                "Advanced Notice",
                "Ownership",
                "Safety/Health",
                "Close Conference",
                "Emphasis",
                "Case Closed",
                "Keywords",
            ]
            .into_iter()
            .map(|label| FieldSpec::labeled("p", label)),
        );

        fields
    }

    pub fn sections() -> Vec<SectionSpec> {
        vec![
            SectionSpec::table(
                SectionKind::Indexed,
                "Related Activity",
                "Related Activity {column} {index}",
                &["Type", "Nr", "Safety", "Health"],
            ),
            SectionSpec::table(
                SectionKind::Labeled,
                "Violation Summary",
                "{label} {column}",
                &["Serious", "Willful", "Repeat", "Other", "Unclass", "Total"],
            ),
            SectionSpec::table(
                SectionKind::Indexed,
                "Violation Items",
                "Violation Item {index} {column}",
                &[
                    "Citation ID",
                    "Citation Type",
                    "Standard Cited",
                    "Issuance Date",
                    "Abatement Due Date",
                    "Current Penalty",
                    "Initial Penalty",
                    "FTA Penalty",
                    "Contest",
                    "Latest Event",
                    "Note",
                ],
            ),
            SectionSpec {
                name: "Investigation Summary".into(),
                kind: SectionKind::Narrative,
                selector: "h4".into(),
                label: "Investigation Summary".into(),
                columns: Vec::new(),
                key_template: key_template(),
            },
        ]
    }
}
