// src/services/extractor.rs

//! Record extraction from loaded detail pages.
//!
//! Applies a [`PageLayout`] to raw markup. A field or section that cannot be
//! found degrades to an empty value (or is skipped) with a warning; it never
//! aborts extraction of the rest of the record.

use scraper::{ElementRef, Html, Node, Selector};

use crate::error::{AppError, Result};
use crate::models::{FieldRecord, FieldSpec, PageLayout, SectionKind, SectionSpec};
use crate::utils::{join_lines, normalize_lines, sanitize, strip_label};

/// Elements rendered on their own line.
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "caption", "dd", "div", "dl", "dt",
    "fieldset", "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6",
    "header", "hr", "li", "main", "nav", "ol", "p", "pre", "section", "table", "tbody",
    "tfoot", "thead", "tr", "ul",
];

/// Outcome of extracting one page.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// Page content was present; individual fields may still be empty.
    Complete(FieldRecord),
    /// Page loaded but its content container never appeared. Every configured
    /// field is present and empty.
    Degraded(FieldRecord),
}

impl Extraction {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded(_))
    }

    pub fn record(&self) -> &FieldRecord {
        match self {
            Self::Complete(record) | Self::Degraded(record) => record,
        }
    }

    pub fn into_record(self) -> FieldRecord {
        match self {
            Self::Complete(record) | Self::Degraded(record) => record,
        }
    }
}

struct CompiledField {
    spec: FieldSpec,
    selector: Selector,
}

struct CompiledSection {
    spec: SectionSpec,
    selector: Selector,
}

/// Selectors used while walking sections.
struct Probes {
    strong: Selector,
    caption: Selector,
    row: Selector,
    cell: Selector,
    header_cell: Selector,
}

/// Extracts [`FieldRecord`]s according to a page layout.
pub struct RecordExtractor {
    ready: Selector,
    ready_source: String,
    fields: Vec<CompiledField>,
    sections: Vec<CompiledSection>,
    probes: Probes,
}

impl RecordExtractor {
    /// Compile every selector of `layout`.
    pub fn new(layout: PageLayout) -> Result<Self> {
        let ready = Self::parse_selector(&layout.ready_selector)?;

        let fields = layout
            .fields
            .into_iter()
            .map(|spec| {
                let selector = Self::parse_selector(&spec.selector)?;
                Ok(CompiledField { spec, selector })
            })
            .collect::<Result<Vec<_>>>()?;

        let sections = layout
            .sections
            .into_iter()
            .map(|spec| {
                let selector = Self::parse_selector(&spec.selector)?;
                Ok(CompiledSection { spec, selector })
            })
            .collect::<Result<Vec<_>>>()?;

        let probes = Probes {
            strong: Self::parse_selector("strong")?,
            caption: Self::parse_selector("caption")?,
            row: Self::parse_selector("tr")?,
            cell: Self::parse_selector("td")?,
            header_cell: Self::parse_selector("th")?,
        };

        Ok(Self {
            ready,
            ready_source: layout.ready_selector,
            fields,
            sections,
            probes,
        })
    }

    /// Names of the single-value fields, in layout order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.spec.name.as_str())
    }

    /// Extract one record from page markup.
    pub fn extract(&self, markup: &str, identifier: &str) -> Extraction {
        let document = Html::parse_document(markup);
        let root = document.root_element();

        if root.select(&self.ready).next().is_none() {
            log::warn!(
                "Page content '{}' missing for {}; keeping an empty record",
                self.ready_source,
                identifier
            );
            return Extraction::Degraded(FieldRecord::blank(self.field_names()));
        }

        let mut record = FieldRecord::new();

        for field in &self.fields {
            match self.extract_field(root, field) {
                Some(value) => record.insert(&field.spec.name, value),
                None => {
                    log::warn!(
                        "Failed to extract {} using {} for {}",
                        field.spec.name,
                        field.spec.path(),
                        identifier
                    );
                    record.insert(&field.spec.name, String::new());
                }
            }
        }

        for section in &self.sections {
            match section.spec.kind {
                SectionKind::Indexed | SectionKind::Labeled => {
                    self.extract_table(root, section, &mut record, identifier)
                }
                SectionKind::Narrative => {
                    self.extract_narrative(root, section, &mut record, identifier)
                }
            }
        }

        Extraction::Complete(record)
    }

    fn extract_field(&self, root: ElementRef<'_>, field: &CompiledField) -> Option<String> {
        let spec = &field.spec;
        let element = root.select(&field.selector).find(|el| match &spec.label {
            Some(label) => self.label_matches(*el, label, spec.label_prefix),
            None => true,
        })?;

        let mut text = element_text(element);
        if spec.strip_label {
            text = strip_label(&text).to_string();
        }
        if spec.join_lines {
            text = join_lines(&text);
        }
        Some(sanitize(&text))
    }

    fn extract_table(
        &self,
        root: ElementRef<'_>,
        section: &CompiledSection,
        record: &mut FieldRecord,
        identifier: &str,
    ) {
        let spec = &section.spec;
        let table = root.select(&section.selector).find(|table| {
            table
                .select(&self.probes.caption)
                .next()
                .is_some_and(|caption| normalize_label(&element_text(caption)) == spec.label)
        });

        let Some(table) = table else {
            log::warn!("{} table not found for {}", spec.name, identifier);
            return;
        };

        // The first row holds the column headers.
        for (index, row) in table.select(&self.probes.row).skip(1).enumerate() {
            let index = index + 1;
            let cells: Vec<ElementRef<'_>> = row.select(&self.probes.cell).collect();

            let label = match spec.kind {
                SectionKind::Labeled => match row.select(&self.probes.header_cell).next() {
                    Some(th) => sanitize(&cell_text(th)),
                    None => {
                        log::warn!(
                            "{} row {} has no label cell for {}",
                            spec.name,
                            index,
                            identifier
                        );
                        continue;
                    }
                },
                _ => String::new(),
            };

            for (position, column) in spec.columns.iter().enumerate() {
                let value = match cells.get(position) {
                    Some(cell) => sanitize(&cell_text(*cell)),
                    None => {
                        log::warn!(
                            "{} row {} is missing column '{}' for {}",
                            spec.name,
                            index,
                            column,
                            identifier
                        );
                        String::new()
                    }
                };
                record.insert(spec.key(index, &label, column), value);
            }
        }
    }

    fn extract_narrative(
        &self,
        root: ElementRef<'_>,
        section: &CompiledSection,
        record: &mut FieldRecord,
        identifier: &str,
    ) {
        let spec = &section.spec;
        let heading = root
            .select(&section.selector)
            .find(|el| self.label_matches(*el, &spec.label, false));

        let Some(heading) = heading else {
            log::warn!("{} not found for {}", spec.name, identifier);
            return;
        };

        let mut long_text = None;

        for sibling in heading.next_siblings().filter_map(ElementRef::wrap) {
            let element = sibling.value();
            if element.name() == "div" && element.classes().any(|c| c == "row-fluid") {
                for item in sibling
                    .children()
                    .filter_map(ElementRef::wrap)
                    .filter(|child| child.value().name() == "div")
                {
                    let text = cell_text(item);
                    match text.split_once(": ") {
                        Some((key, value)) => {
                            record.insert(sanitize(key.trim()), sanitize(value.trim()))
                        }
                        None if !text.is_empty() => {
                            record.insert(format!("{} Short", spec.name), sanitize(&text))
                        }
                        None => {}
                    }
                }
            } else if element.name() == "p" && long_text.is_none() {
                long_text = Some(sanitize(&cell_text(sibling)));
            }
        }

        let long_text = long_text.unwrap_or_else(|| {
            log::warn!("{} has no long text for {}", spec.name, identifier);
            String::new()
        });
        record.insert(format!("{} Long", spec.name), long_text);
    }

    /// Label carried by an element: the text of its first `strong`
    /// descendant, or its own text when it has none or is a `strong`.
    fn label_matches(&self, element: ElementRef<'_>, label: &str, prefix: bool) -> bool {
        let source = if element.value().name() == "strong" {
            element
        } else {
            element.select(&self.probes.strong).next().unwrap_or(element)
        };

        let text = normalize_label(&element_text(source));
        let label = normalize_label(label);
        if prefix {
            text.starts_with(&label)
        } else {
            text == label
        }
    }

    fn parse_selector(s: &str) -> Result<Selector> {
        Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
    }
}

/// Rendered text of an element: block elements and `<br>` break lines,
/// whitespace collapses within a line.
fn element_text(element: ElementRef<'_>) -> String {
    let mut raw = String::new();
    push_text(element, &mut raw);
    normalize_lines(&raw)
}

/// Rendered text flattened onto one line.
fn cell_text(element: ElementRef<'_>) -> String {
    element_text(element).lines().collect::<Vec<_>>().join(" ")
}

fn push_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(&**text),
            Node::Element(el) => {
                let name = el.name();
                if name == "br" {
                    out.push('\n');
                    continue;
                }
                if matches!(name, "script" | "style") {
                    continue;
                }

                let block = BLOCK_ELEMENTS.contains(&name);
                if block {
                    out.push('\n');
                }
                if let Some(child_el) = ElementRef::wrap(child) {
                    push_text(child_el, out);
                }
                if block {
                    out.push('\n');
                } else if matches!(name, "td" | "th") {
                    out.push(' ');
                }
            }
            _ => {}
        }
    }
}

fn normalize_label(text: &str) -> String {
    text.trim().trim_end_matches(':').trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DETAIL_PAGE: &str = r#"
        <html><body>
        <div class="row-fluid">
          <p><strong>Inspection Information - Office: Houston South</strong></p>
          <div class="span4"><strong>Inspection Nr</strong>: 1234567.015</div>
          <div class="span4"><strong>Report ID</strong>: 0626700</div>
          <div class="span4"><strong>Date Opened</strong>: 03/04/2021</div>
          <div class="well well-small">Case Status: CLOSED</div>
          <p><strong>Site Address</strong>:<br>Acme Corp<br>100 Main St<br>Houston, TX 77001</p>
          <p><strong>Mailing Address</strong>: PO Box 1<br>Houston, TX 77002</p>
          <div class="span4"><p><strong>Union Status</strong>: NonUnion</p></div>
          <p><strong>SIC</strong>: 1623</p>
          <p><strong>NAICS</strong>: 237110/Water and Sewer Line</p>
          <p><strong>Inspection Type</strong>: Accident</p>
          <p><strong>Scope</strong>: Complete</p>
          <p><strong>Advanced Notice</strong>: N</p>
          <p><strong>Ownership</strong>: Private</p>
          <p><strong>Safety/Health</strong>: Safety</p>
          <p><strong>Close Conference</strong>: 03/10/2021</p>
          <p><strong>Emphasis</strong>: L:Fall</p>
          <p><strong>Case Closed</strong>: 09/01/2021</p>
        </div>
        <table>
          <caption>Related Activity</caption>
          <tr><th>Type</th><th>Activity Nr</th><th>Safety</th><th>Health</th></tr>
          <tr><td>Accident</td><td>111</td><td>Yes</td><td></td></tr>
          <tr><td>Complaint</td><td>222</td><td></td><td>Yes</td></tr>
        </table>
        <table>
          <caption>Violation Summary</caption>
          <tr><th></th><th>Serious</th><th>Willful</th><th>Repeat</th><th>Other</th><th>Unclass</th><th>Total</th></tr>
          <tr><th>Initial Violations</th><td>2</td><td>0</td><td>0</td><td>1</td><td>0</td><td>3</td></tr>
          <tr><th>Current Violations</th><td>1</td><td>0</td><td>0</td><td>1</td><td>0</td><td>2</td></tr>
        </table>
        <table>
          <caption>Violation Items</caption>
          <tr><th>#</th></tr>
          <tr><td>01001</td><td>Serious</td><td>19260501</td><td>03/05/2021</td><td>03/20/2021</td>
              <td>$9,000</td><td>$13,000</td><td>$0</td><td>I</td><td>F</td><td></td></tr>
        </table>
        <h4>Investigation Summary</h4>
        <div class="row-fluid">
          <div>Inspection: 1234567.015</div>
          <div>Employee fell from ladder</div>
        </div>
        <p>At 10:00 a.m. on March 1, an employee was working on a ladder.</p>
        <p><strong>Keywords:</strong> fall, ladder</p>
        </body></html>
    "#;

    fn extractor() -> RecordExtractor {
        RecordExtractor::new(PageLayout::default()).unwrap()
    }

    #[test]
    fn test_extracts_header_fields() {
        let extraction = extractor().extract(DETAIL_PAGE, "1234567");
        assert!(!extraction.is_degraded());
        let record = extraction.record();

        assert_eq!(record.get("Inspection Office"), Some("Houston South"));
        assert_eq!(record.get("Inspection Nr"), Some("1234567.015"));
        assert_eq!(record.get("Report ID"), Some("0626700"));
        assert_eq!(record.get("Case Status"), Some("CLOSED"));
        assert_eq!(record.get("Union Status"), Some("NonUnion"));
        assert_eq!(record.get("NAICS"), Some("237110/Water and Sewer Line"));
        assert_eq!(record.get("Emphasis"), Some("L:Fall"));
        assert_eq!(record.get("Keywords"), Some("fall, ladder"));
    }

    #[test]
    fn test_joins_address_lines() {
        let record = extractor().extract(DETAIL_PAGE, "1").into_record();
        assert_eq!(
            record.get("Site Address"),
            Some("Acme Corp, 100 Main St, Houston, TX 77001")
        );
        assert_eq!(
            record.get("Mailing Address"),
            Some("PO Box 1, Houston, TX 77002")
        );
    }

    #[test]
    fn test_indexed_rows_keep_document_order() {
        let record = extractor().extract(DETAIL_PAGE, "1").into_record();
        assert_eq!(record.get("Related Activity Type 1"), Some("Accident"));
        assert_eq!(record.get("Related Activity Nr 1"), Some("111"));
        assert_eq!(record.get("Related Activity Type 2"), Some("Complaint"));
        assert_eq!(record.get("Related Activity Health 2"), Some("Yes"));
        assert_eq!(record.get("Violation Item 1 Citation ID"), Some("01001"));
        assert_eq!(record.get("Violation Item 1 Current Penalty"), Some("$9,000"));
        assert_eq!(record.get("Violation Item 1 Note"), Some(""));
    }

    #[test]
    fn test_labeled_rows_use_row_header() {
        let record = extractor().extract(DETAIL_PAGE, "1").into_record();
        assert_eq!(record.get("Initial Violations Serious"), Some("2"));
        assert_eq!(record.get("Initial Violations Total"), Some("3"));
        assert_eq!(record.get("Current Violations Total"), Some("2"));
    }

    #[test]
    fn test_narrative_section() {
        let record = extractor().extract(DETAIL_PAGE, "1").into_record();
        assert_eq!(record.get("Inspection"), Some("1234567.015"));
        assert_eq!(
            record.get("Investigation Summary Short"),
            Some("Employee fell from ladder")
        );
        assert_eq!(
            record.get("Investigation Summary Long"),
            Some("At 10:00 a.m. on March 1, an employee was working on a ladder.")
        );
    }

    #[test]
    fn test_missing_field_is_empty_and_others_survive() {
        let page = DETAIL_PAGE.replace("<p><strong>SIC</strong>: 1623</p>", "");
        let record = extractor().extract(&page, "1").into_record();

        assert_eq!(record.get("SIC"), Some(""));
        assert_eq!(record.get("NAICS"), Some("237110/Water and Sewer Line"));
        assert_eq!(record.get("Report ID"), Some("0626700"));
    }

    #[test]
    fn test_missing_section_is_skipped() {
        let page = DETAIL_PAGE.replace("Related Activity", "Other Activity");
        let record = extractor().extract(&page, "1").into_record();

        assert!(record.names().all(|n| !n.starts_with("Related Activity")));
        assert_eq!(record.get("Initial Violations Serious"), Some("2"));
    }

    #[test]
    fn test_short_row_fills_missing_cells() {
        let page = r#"<div class="row-fluid"></div>
            <table><caption>Related Activity</caption>
            <tr><th>Type</th></tr><tr><td>Accident</td></tr></table>"#;
        let record = extractor().extract(page, "1").into_record();

        assert_eq!(record.get("Related Activity Type 1"), Some("Accident"));
        assert_eq!(record.get("Related Activity Health 1"), Some(""));
    }

    #[test]
    fn test_degraded_page_has_all_fields_blank() {
        let extraction = extractor().extract("<html><body>Service unavailable</body></html>", "9");
        assert!(extraction.is_degraded());

        let record = extraction.record();
        assert_eq!(record.len(), 19);
        assert_eq!(record.filled_count(), 0);
        assert_eq!(record.get("Inspection Nr"), Some(""));
    }

    #[test]
    fn test_control_characters_removed() {
        let page = "<div class=\"row-fluid\"><p><strong>SIC</strong>: 16\u{0007}23\u{0085}</p></div>";
        let record = extractor().extract(page, "1").into_record();
        assert_eq!(record.get("SIC"), Some("1623"));
    }

    #[test]
    fn test_invalid_selector_rejected() {
        let mut layout = PageLayout::default();
        layout.fields.push(FieldSpec::new("Broken", "[[invalid"));
        assert!(RecordExtractor::new(layout).is_err());
    }

    #[test]
    fn test_element_text_breaks_blocks() {
        let html = Html::parse_fragment("<div><p>one  two</p><span>three</span><br>four</div>");
        let div = html.select(&Selector::parse("div").unwrap()).next().unwrap();
        assert_eq!(element_text(div), "one two\nthree\nfour");
    }
}
