/*!
Tabular export of ranked class results.

Two formats: CSV straight from the `csv` crate, and a minimal
single-sheet `.xlsx`. An xlsx file is just a zip archive of XML parts,
so rather than pull in a whole spreadsheet library we write the four
parts a bare workbook needs and let the `zip` crate do the packaging.
Every cell is an inline string or a number; no shared-string table, no
styles.
*/
use std::io::{Cursor, Write};

use zip::write::{FileOptions, ZipWriter};

use crate::grade::{ordinal, Ranked};
use crate::school::Term;

const HEADER_ROW: &[&str] = &[
    "Position", "Student ID", "Name",
    "Total", "Average", "Percent", "Grade", "Passed",
];

fn passed_text(passed: bool) -> &'static str {
    if passed { "Pass" } else { "Fail" }
}

/// The ranked results of one class as CSV, title row first.
pub fn csv_report(
    school_name: &str,
    classname: &str,
    term: Term,
    ranked: &[Ranked],
) -> Result<Vec<u8>, String> {
    log::trace!(
        "csv_report( {:?}, {:?}, {}, [ {} rows ] ) called.",
        school_name, classname, term, ranked.len()
    );

    let mut w = csv::Writer::from_writer(vec![]);

    let title = format!("{} - {} - {}", school_name, classname, term);
    w.write_record([title.as_str(), "", "", "", "", "", "", ""])
        .map_err(|e| format!("Error writing CSV title: {}", &e))?;
    w.write_record(HEADER_ROW)
        .map_err(|e| format!("Error writing CSV header: {}", &e))?;

    for r in ranked.iter() {
        let position = ordinal(r.position);
        let total = format!("{:.1}", r.total);
        let average = format!("{:.1}", r.average);
        let percent = format!("{:.1}", r.percent);
        let grade = r.grade.to_string();
        w.write_record([
            position.as_str(),
            r.student_id.as_str(),
            r.firstname.as_str(),
            total.as_str(),
            average.as_str(),
            percent.as_str(),
            grade.as_str(),
            passed_text(r.passed),
        ]).map_err(|e| format!(
            "Error writing CSV row for {:?}: {}", &r.student_id, &e
        ))?;
    }

    w.into_inner()
        .map_err(|e| format!("Error finalizing CSV data: {}", &e))
}

fn xml_escape(text: &str) -> String {
    let mut s = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => s.push_str("&amp;"),
            '<' => s.push_str("&lt;"),
            '>' => s.push_str("&gt;"),
            '"' => s.push_str("&quot;"),
            _ => s.push(c),
        }
    }
    s
}

fn push_string_cell(sheet: &mut String, text: &str) {
    sheet.push_str("<c t=\"inlineStr\"><is><t>");
    sheet.push_str(&xml_escape(text));
    sheet.push_str("</t></is></c>");
}

fn push_number_cell(sheet: &mut String, x: f32) {
    sheet.push_str("<c><v>");
    sheet.push_str(&format!("{:.1}", x));
    sheet.push_str("</v></c>");
}

static CONTENT_TYPES: &str = concat!(
    "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>",
    "<Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">",
    "<Default Extension=\"rels\" ContentType=\"application/vnd.openxmlformats-package.relationships+xml\"/>",
    "<Default Extension=\"xml\" ContentType=\"application/xml\"/>",
    "<Override PartName=\"/xl/workbook.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml\"/>",
    "<Override PartName=\"/xl/worksheets/sheet1.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml\"/>",
    "</Types>",
);

static ROOT_RELS: &str = concat!(
    "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>",
    "<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">",
    "<Relationship Id=\"rId1\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument\" Target=\"xl/workbook.xml\"/>",
    "</Relationships>",
);

static WORKBOOK_RELS: &str = concat!(
    "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>",
    "<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">",
    "<Relationship Id=\"rId1\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet\" Target=\"worksheets/sheet1.xml\"/>",
    "</Relationships>",
);

fn workbook_xml(sheet_name: &str) -> String {
    format!(concat!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>",
        "<workbook xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\" ",
        "xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\">",
        "<sheets><sheet name=\"{}\" sheetId=\"1\" r:id=\"rId1\"/></sheets>",
        "</workbook>",
    ), xml_escape(sheet_name))
}

fn sheet_xml(
    school_name: &str,
    classname: &str,
    term: Term,
    ranked: &[Ranked],
) -> String {
    let mut s = String::from(concat!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>",
        "<worksheet xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\">",
        "<sheetData>",
    ));

    s.push_str("<row>");
    push_string_cell(
        &mut s,
        &format!("{} - {} - {}", school_name, classname, term)
    );
    s.push_str("</row><row>");
    for label in HEADER_ROW.iter() {
        push_string_cell(&mut s, label);
    }
    s.push_str("</row>");

    for r in ranked.iter() {
        s.push_str("<row>");
        push_string_cell(&mut s, &ordinal(r.position));
        push_string_cell(&mut s, &r.student_id);
        push_string_cell(&mut s, &r.firstname);
        push_number_cell(&mut s, r.total);
        push_number_cell(&mut s, r.average);
        push_number_cell(&mut s, r.percent);
        push_string_cell(&mut s, &r.grade.to_string());
        push_string_cell(&mut s, passed_text(r.passed));
        s.push_str("</row>");
    }

    s.push_str("</sheetData></worksheet>");
    s
}

/// The ranked results of one class as a single-sheet xlsx workbook.
pub fn xlsx_report(
    school_name: &str,
    classname: &str,
    term: Term,
    ranked: &[Ranked],
) -> Result<Vec<u8>, String> {
    log::trace!(
        "xlsx_report( {:?}, {:?}, {}, [ {} rows ] ) called.",
        school_name, classname, term, ranked.len()
    );

    let mut zw = ZipWriter::new(Cursor::new(Vec::new()));
    let opts = FileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    let parts: &[(&str, String)] = &[
        ("[Content_Types].xml", CONTENT_TYPES.to_owned()),
        ("_rels/.rels", ROOT_RELS.to_owned()),
        ("xl/workbook.xml", workbook_xml(classname)),
        ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS.to_owned()),
        (
            "xl/worksheets/sheet1.xml",
            sheet_xml(school_name, classname, term, ranked),
        ),
    ];

    for (name, body) in parts.iter() {
        zw.start_file(*name, opts)
            .map_err(|e| format!("Error starting {:?} in workbook: {}", name, &e))?;
        zw.write_all(body.as_bytes())
            .map_err(|e| format!("Error writing {:?} in workbook: {}", name, &e))?;
    }

    let cursor = zw.finish()
        .map_err(|e| format!("Error finalizing workbook: {}", &e))?;
    Ok(cursor.into_inner())
}

/// Filename for a download, with the class and term slugged in.
pub fn report_filename(classname: &str, term: Term, extension: &str) -> String {
    let term_slug = term.to_string().replace(' ', "_");
    let class_slug: String = classname.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{}_{}_results.{}", class_slug, term_slug, extension)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Read;

    use crate::grade::Grade;

    fn sample_class() -> Vec<Ranked> {
        vec![
            Ranked {
                student_id: "26/001/JSS1".to_owned(),
                firstname: "Ada".to_owned(),
                total: 150.0,
                average: 75.0,
                percent: 75.0,
                grade: Grade::A,
                passed: true,
                position: 1,
            },
            Ranked {
                student_id: "26/002/JSS1".to_owned(),
                firstname: "Emeka & Co".to_owned(),
                total: 80.0,
                average: 40.0,
                percent: 40.0,
                grade: Grade::D,
                passed: false,
                position: 2,
            },
        ]
    }

    #[test]
    fn csv_rows_match_ranking() {
        let data = csv_report(
            "Kings College", "JSS1", Term::First, &sample_class()
        ).unwrap();

        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .has_headers(false)
            .from_reader(data.as_slice());
        let rows: Vec<csv::StringRecord> =
            rdr.records().map(|r| r.unwrap()).collect();

        assert_eq!(rows.len(), 4);
        assert!(rows[0][0].contains("Kings College"));
        assert_eq!(&rows[1][1], "Student ID");
        assert_eq!(&rows[2][0], "1st");
        assert_eq!(&rows[2][6], "A");
        assert_eq!(&rows[3][2], "Emeka & Co");
        assert_eq!(&rows[3][7], "Fail");
    }

    #[test]
    fn xlsx_is_a_readable_workbook() {
        let data = xlsx_report(
            "Kings College", "JSS1", Term::First, &sample_class()
        ).unwrap();

        let mut za = zip::ZipArchive::new(Cursor::new(data)).unwrap();
        for part in [
            "[Content_Types].xml", "_rels/.rels",
            "xl/workbook.xml", "xl/worksheets/sheet1.xml",
        ] {
            assert!(za.by_name(part).is_ok(), "missing part {:?}", part);
        }

        let mut sheet = String::new();
        za.by_name("xl/worksheets/sheet1.xml").unwrap()
            .read_to_string(&mut sheet).unwrap();
        assert!(sheet.contains("<t>26/001/JSS1</t>"));
        // The ampersand in the name has to be escaped.
        assert!(sheet.contains("Emeka &amp; Co"));
        assert!(!sheet.contains("Emeka & Co"));
    }

    #[test]
    fn filenames_are_slugged() {
        assert_eq!(
            report_filename("JSS 1B", Term::Second, "xlsx"),
            "JSS_1B_Second_Term_results.xlsx"
        );
    }
}
