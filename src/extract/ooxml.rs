//! OOXML (DOCX, XLSX) text extraction over `zip` + `quick-xml`.
//!
//! DOCX yields paragraph text separated by blank lines. XLSX yields one CSV
//! section per non-empty sheet, in workbook order, each preceded by a
//! `--- Sheet: <name> ---` header line.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::{Cursor, Read};

use super::ExtractError;

/// Maximum sheets to process in a workbook.
const XLSX_MAX_SHEETS: usize = 100;
/// Maximum cells to process per sheet (avoids unbounded memory).
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;
/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

type Archive<'a> = zip::ZipArchive<Cursor<&'a [u8]>>;

/// True when `bytes` start with a ZIP local file header.
pub fn is_zip(bytes: &[u8]) -> bool {
    bytes.starts_with(b"PK\x03\x04")
}

fn open_archive(bytes: &[u8]) -> Result<Archive<'_>, ExtractError> {
    zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| ExtractError::Ooxml(e.to_string()))
}

fn has_entry(archive: &Archive<'_>, name: &str) -> bool {
    archive.file_names().any(|n| n == name)
}

fn read_zip_entry_bounded(
    archive: &mut Archive<'_>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= max_bytes {
        return Err(ExtractError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

fn xml_err(e: impl std::fmt::Display) -> ExtractError {
    ExtractError::Ooxml(e.to_string())
}

fn attr_value(e: &BytesStart<'_>, local: &[u8]) -> Option<String> {
    e.attributes().flatten().find_map(|a| {
        if a.key.local_name().as_ref() == local {
            a.unescape_value().ok().map(|v| v.into_owned())
        } else {
            None
        }
    })
}

// ============ DOCX ============

/// Extracts raw text from a `.docx` package.
pub fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    if !has_entry(&archive, "word/document.xml") {
        return Err(ExtractError::Ooxml(
            "word/document.xml not found".to_string(),
        ));
    }
    let doc_xml = read_zip_entry_bounded(&mut archive, "word/document.xml", MAX_XML_ENTRY_BYTES)?;
    docx_body_text(&doc_xml)
}

fn docx_body_text(xml: &[u8]) -> Result<String, ExtractError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut out = String::new();
    let mut paragraph = String::new();
    let mut in_run = false;
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"r" => in_run = true,
                b"t" if in_run => in_text = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                // tab stops in paragraph properties are also `w:tab`
                b"tab" if in_run => paragraph.push('\t'),
                b"br" | b"cr" if in_run => paragraph.push('\n'),
                b"p" => out.push_str("\n\n"),
                _ => {}
            },
            Ok(Event::Text(te)) if in_text => {
                paragraph.push_str(&te.unescape().map_err(xml_err)?);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"r" => in_run = false,
                b"t" => in_text = false,
                b"p" => {
                    out.push_str(&paragraph);
                    out.push_str("\n\n");
                    paragraph.clear();
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_err(e)),
            _ => {}
        }
        buf.clear();
    }
    out.push_str(&paragraph);
    Ok(out)
}

// ============ XLSX ============

/// Extracts every non-empty sheet of an `.xlsx` workbook as CSV.
///
/// An empty workbook yields an empty string.
pub fn extract_xlsx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let shared_strings = read_shared_strings(&mut archive)?;
    let sheets = list_sheets(&mut archive)?;

    let mut pieces = Vec::new();
    for (name, path) in sheets.into_iter().take(XLSX_MAX_SHEETS) {
        if !has_entry(&archive, &path) {
            continue;
        }
        let sheet_xml = read_zip_entry_bounded(&mut archive, &path, MAX_XML_ENTRY_BYTES)?;
        let csv = sheet_to_csv(&sheet_xml, &shared_strings)?;
        if !csv.trim().is_empty() {
            pieces.push(format!("--- Sheet: {} ---\n{}", name, csv));
        }
    }
    Ok(pieces.join("\n\n"))
}

fn read_shared_strings(archive: &mut Archive<'_>) -> Result<Vec<String>, ExtractError> {
    if !has_entry(archive, "xl/sharedStrings.xml") {
        return Ok(Vec::new());
    }
    let xml = read_zip_entry_bounded(archive, "xl/sharedStrings.xml", MAX_XML_ENTRY_BYTES)?;
    let mut strings = Vec::new();
    let mut reader = Reader::from_reader(xml.as_slice());
    let mut buf = Vec::new();
    let mut current: Option<String> = None;
    let mut in_t = false;
    // phonetic runs carry a reading of the text, not the text itself
    let mut in_phonetic = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"rPh" => in_phonetic = true,
                b"t" => in_t = !in_phonetic,
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"si" => {
                strings.push(String::new());
            }
            Ok(Event::Text(te)) if in_t => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&te.unescape().map_err(xml_err)?);
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"si" => strings.push(current.take().unwrap_or_default()),
                b"rPh" => in_phonetic = false,
                b"t" => in_t = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_err(e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Sheet `(name, zip path)` pairs in workbook order.
///
/// Falls back to `xl/worksheets/sheetN.xml` numbering when the workbook
/// part or its relationships are missing.
fn list_sheets(archive: &mut Archive<'_>) -> Result<Vec<(String, String)>, ExtractError> {
    let rels_name = "xl/_rels/workbook.xml.rels";
    if !has_entry(archive, "xl/workbook.xml") || !has_entry(archive, rels_name) {
        return Ok(list_worksheet_files(archive));
    }

    let workbook = read_zip_entry_bounded(archive, "xl/workbook.xml", MAX_XML_ENTRY_BYTES)?;
    let rels = read_zip_entry_bounded(archive, rels_name, MAX_XML_ENTRY_BYTES)?;
    let targets = read_relationship_targets(&rels)?;

    let mut sheets = Vec::new();
    let mut reader = Reader::from_reader(workbook.as_slice());
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == b"sheet" => {
                let name = attr_value(&e, b"name").unwrap_or_default();
                let target = attr_value(&e, b"id").and_then(|id| targets.get(&id).cloned());
                if let Some(target) = target {
                    sheets.push((name, resolve_workbook_target(&target)));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_err(e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(sheets)
}

fn read_relationship_targets(xml: &[u8]) -> Result<HashMap<String, String>, ExtractError> {
    let mut targets = HashMap::new();
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e))
                if e.local_name().as_ref() == b"Relationship" =>
            {
                if let (Some(id), Some(target)) =
                    (attr_value(&e, b"Id"), attr_value(&e, b"Target"))
                {
                    targets.insert(id, target);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_err(e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(targets)
}

fn resolve_workbook_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{}", target),
    }
}

fn list_worksheet_files(archive: &Archive<'_>) -> Vec<(String, String)> {
    let mut names: Vec<(u32, String)> = archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
        .map(|n| {
            let num = n
                .trim_start_matches("xl/worksheets/sheet")
                .trim_end_matches(".xml")
                .parse::<u32>()
                .unwrap_or(u32::MAX);
            (num, n.to_string())
        })
        .collect();
    names.sort();
    names
        .into_iter()
        .map(|(num, path)| (format!("Sheet{}", num), path))
        .collect()
}

/// Splits an `A1`-style reference into zero-based `(row, col)`.
fn parse_cell_ref(r: &str) -> Option<(usize, usize)> {
    let letters: String = r.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
    let digits = &r[letters.len()..];
    if letters.is_empty() || digits.is_empty() {
        return None;
    }
    let col = letters
        .chars()
        .fold(0usize, |acc, c| acc * 26 + (c.to_ascii_uppercase() as usize - 'A' as usize + 1));
    let row: usize = digits.parse().ok()?;
    Some((row.checked_sub(1)?, col - 1))
}

#[derive(Default)]
struct CellState {
    col: usize,
    kind: Option<String>,
    value: String,
}

fn sheet_to_csv(xml: &[u8], shared_strings: &[String]) -> Result<String, ExtractError> {
    let mut rows: Vec<(usize, Vec<(usize, String)>)> = Vec::new();
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();

    let mut row_idx = 0usize;
    let mut next_row = 0usize;
    let mut row_cells: Vec<(usize, String)> = Vec::new();
    let mut next_col = 0usize;
    let mut cell: Option<CellState> = None;
    let mut in_value = false;
    let mut cell_count = 0usize;

    loop {
        if cell_count >= XLSX_MAX_CELLS_PER_SHEET {
            break;
        }
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"row" => {
                    row_idx = attr_value(&e, b"r")
                        .and_then(|r| r.parse::<usize>().ok())
                        .and_then(|r| r.checked_sub(1))
                        .unwrap_or(next_row);
                    row_cells.clear();
                    next_col = 0;
                }
                b"c" => {
                    let col = attr_value(&e, b"r")
                        .and_then(|r| parse_cell_ref(&r))
                        .map(|(_, c)| c)
                        .unwrap_or(next_col);
                    cell = Some(CellState {
                        col,
                        kind: attr_value(&e, b"t"),
                        value: String::new(),
                    });
                }
                // `v` for stored values, `t` for inline strings
                b"v" | b"t" => in_value = cell.is_some(),
                _ => {}
            },
            Ok(Event::Text(te)) if in_value => {
                if let Some(c) = cell.as_mut() {
                    c.value.push_str(&te.unescape().map_err(xml_err)?);
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => {
                    if let Some(c) = cell.take() {
                        next_col = c.col + 1;
                        let text = resolve_cell_value(&c, shared_strings);
                        if !text.is_empty() {
                            row_cells.push((c.col, text));
                            cell_count += 1;
                        }
                    }
                }
                b"row" => {
                    if !row_cells.is_empty() {
                        rows.push((row_idx, std::mem::take(&mut row_cells)));
                    }
                    next_row = row_idx + 1;
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_err(e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(render_csv(&rows))
}

fn resolve_cell_value(cell: &CellState, shared_strings: &[String]) -> String {
    let raw = cell.value.trim();
    match cell.kind.as_deref() {
        Some("s") => raw
            .parse::<usize>()
            .ok()
            .and_then(|i| shared_strings.get(i).cloned())
            .unwrap_or_default(),
        Some("b") => match raw {
            "1" => "TRUE".to_string(),
            "0" => "FALSE".to_string(),
            other => other.to_string(),
        },
        Some("str") | Some("inlineStr") => cell.value.clone(),
        _ => raw.to_string(),
    }
}

/// Renders the occupied rectangle of a sheet; gaps become empty fields and rows.
fn render_csv(rows: &[(usize, Vec<(usize, String)>)]) -> String {
    let cells = rows.iter().flat_map(|(_, cells)| cells.iter());
    let (Some(min_col), Some(max_col)) = (
        cells.clone().map(|(c, _)| *c).min(),
        cells.map(|(c, _)| *c).max(),
    ) else {
        return String::new();
    };
    let (Some(min_row), Some(max_row)) = (
        rows.iter().map(|(r, _)| *r).min(),
        rows.iter().map(|(r, _)| *r).max(),
    ) else {
        return String::new();
    };

    let by_row: HashMap<usize, &Vec<(usize, String)>> =
        rows.iter().map(|(r, cells)| (*r, cells)).collect();
    let width = max_col - min_col + 1;

    let mut lines = Vec::with_capacity(max_row - min_row + 1);
    for r in min_row..=max_row {
        let mut fields = vec![String::new(); width];
        if let Some(cells) = by_row.get(&r) {
            for (c, v) in cells.iter() {
                fields[c - min_col] = csv_escape(v);
            }
        }
        lines.push(fields.join(","));
    }
    lines.join("\n")
}

pub(super) fn csv_escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;

    pub(crate) fn build_zip(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
            for (name, body) in entries {
                zip.start_file(*name, zip::write::SimpleFileOptions::default())
                    .unwrap();
                zip.write_all(body.as_bytes()).unwrap();
            }
            zip.finish().unwrap();
        }
        buf
    }

    pub(crate) fn docx_with_paragraphs(paragraphs: &[&str]) -> Vec<u8> {
        let body: String = paragraphs
            .iter()
            .map(|p| format!("<w:p><w:r><w:t xml:space=\"preserve\">{}</w:t></w:r></w:p>", p))
            .collect();
        let xml = format!(
            "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
            body
        );
        build_zip(&[("word/document.xml", &xml)])
    }

    /// Two-sheet workbook: sheet "A" uses shared strings, sheet "B" inline strings.
    pub(crate) fn two_sheet_xlsx() -> Vec<u8> {
        let workbook = r#"<?xml version="1.0"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
<sheets><sheet name="A" sheetId="1" r:id="rId1"/><sheet name="B" sheetId="2" r:id="rId2"/></sheets>
</workbook>"#;
        let rels = r#"<?xml version="1.0"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet2.xml"/>
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
</Relationships>"#;
        let shared = r#"<?xml version="1.0"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><si><t>Deliverable</t></si><si><t>Due, date</t></si><si><r><t>Phase </t></r><r><t>one</t></r></si></sst>"#;
        let sheet1 = r#"<?xml version="1.0"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>
<row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c></row>
<row r="2"><c r="A2" t="s"><v>2</v></c><c r="B2"><v>42</v></c></row>
</sheetData></worksheet>"#;
        let sheet2 = r#"<?xml version="1.0"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>
<row r="1"><c r="A1" t="inlineStr"><is><t>Penalty "clause"</t></is></c><c r="C1" t="b"><v>1</v></c></row>
</sheetData></worksheet>"#;
        build_zip(&[
            ("xl/workbook.xml", workbook),
            ("xl/_rels/workbook.xml.rels", rels),
            ("xl/sharedStrings.xml", shared),
            ("xl/worksheets/sheet1.xml", sheet1),
            ("xl/worksheets/sheet2.xml", sheet2),
        ])
    }

    #[test]
    fn docx_paragraphs_separated_by_blank_lines() {
        let text = extract_docx(&docx_with_paragraphs(&["First clause.", "Second clause."])).unwrap();
        assert_eq!(text, "First clause.\n\nSecond clause.\n\n");
    }

    #[test]
    fn docx_preserves_run_spacing_and_tabs() {
        let xml = r#"<w:document xmlns:w="w"><w:body><w:p><w:pPr><w:tabs><w:tab w:val="left" w:pos="720"/></w:tabs></w:pPr><w:r><w:t xml:space="preserve">Net </w:t></w:r><w:r><w:tab/><w:t>30 &amp; days</w:t></w:r></w:p></w:body></w:document>"#;
        let text = extract_docx(&build_zip(&[("word/document.xml", xml)])).unwrap();
        assert_eq!(text, "Net \t30 & days\n\n");
    }

    #[test]
    fn docx_without_document_part_errors() {
        let err = extract_docx(&build_zip(&[("other.xml", "<x/>")])).unwrap_err();
        assert!(matches!(err, ExtractError::Ooxml(_)));
    }

    #[test]
    fn invalid_zip_returns_error_for_docx() {
        let err = extract_docx(b"not a zip").unwrap_err();
        assert!(matches!(err, ExtractError::Ooxml(_)));
    }

    #[test]
    fn xlsx_two_sheets_in_workbook_order() {
        let text = extract_xlsx(&two_sheet_xlsx()).unwrap();
        assert_eq!(
            text,
            "--- Sheet: A ---\nDeliverable,\"Due, date\"\nPhase one,42\n\n--- Sheet: B ---\n\"Penalty \"\"clause\"\"\",,TRUE"
        );
        let a = text.find("--- Sheet: A ---").unwrap();
        let b = text.find("--- Sheet: B ---").unwrap();
        assert!(a < b);
    }

    #[test]
    fn xlsx_empty_workbook_is_empty_string() {
        let workbook = r#"<workbook xmlns:r="r"><sheets><sheet name="Empty" sheetId="1" r:id="rId1"/></sheets></workbook>"#;
        let rels = r#"<Relationships><Relationship Id="rId1" Target="worksheets/sheet1.xml"/></Relationships>"#;
        let sheet = r#"<worksheet><sheetData/></worksheet>"#;
        let bytes = build_zip(&[
            ("xl/workbook.xml", workbook),
            ("xl/_rels/workbook.xml.rels", rels),
            ("xl/worksheets/sheet1.xml", sheet),
        ]);
        assert_eq!(extract_xlsx(&bytes).unwrap(), "");
    }

    #[test]
    fn xlsx_without_workbook_falls_back_to_sheet_files() {
        let sheet = r#"<worksheet><sheetData><row r="2"><c r="B2"><v>7</v></c></row></sheetData></worksheet>"#;
        let bytes = build_zip(&[("xl/worksheets/sheet1.xml", sheet)]);
        assert_eq!(extract_xlsx(&bytes).unwrap(), "--- Sheet: Sheet1 ---\n7");
    }

    #[test]
    fn csv_rows_fill_gaps() {
        let rows = vec![
            (0, vec![(0, "a".to_string())]),
            (2, vec![(1, "b".to_string())]),
        ];
        assert_eq!(render_csv(&rows), "a,\n,\n,b");
    }

    #[test]
    fn cell_refs_parse() {
        assert_eq!(parse_cell_ref("A1"), Some((0, 0)));
        assert_eq!(parse_cell_ref("AB12"), Some((11, 27)));
        assert_eq!(parse_cell_ref("12"), None);
    }
}
