use std::{fs, io::Read, path::Path};

use anyhow::{Context, Result, anyhow};
use pdf_extract::extract_text as extract_pdf_text;
use quick_xml::{Reader as XmlReader, events::Event};
use zip::ZipArchive;

pub const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "docx", "pdf"];

/// Extract the essay text from an uploaded document.
pub fn read_document_text(path: &Path) -> Result<String> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_lowercase();

    let content = match extension.as_str() {
        "pdf" => extract_pdf_text(path)
            .with_context(|| format!("failed to extract PDF text from {}", path.display()))?,
        "docx" => extract_docx_text(path)?,
        "txt" => fs::read_to_string(path)
            .with_context(|| format!("failed to read text file {}", path.display()))?,
        other => return Err(anyhow!("unsupported file type: {}", other)),
    };

    Ok(content.trim().to_string())
}

fn extract_docx_text(path: &Path) -> Result<String> {
    let file = fs::File::open(path)
        .with_context(|| format!("failed to open DOCX file {}", path.display()))?;
    let mut archive = ZipArchive::new(file)
        .with_context(|| format!("failed to open DOCX archive {}", path.display()))?;

    let mut document = archive
        .by_name("word/document.xml")
        .with_context(|| format!("missing word/document.xml in {}", path.display()))?;

    let mut xml = String::new();
    document
        .read_to_string(&mut xml)
        .with_context(|| format!("failed to read DOCX XML for {}", path.display()))?;

    docx_xml_to_text(&xml)
}

/// Paragraphs end with a newline so the essay keeps its layout.
fn docx_xml_to_text(xml: &str) -> Result<String> {
    let mut reader = XmlReader::from_str(xml);
    let mut output = String::new();
    let mut in_text_node = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                if e.name().as_ref() == b"w:t" {
                    in_text_node = true;
                }
            }
            Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                b"w:tab" => output.push('\t'),
                b"w:br" => output.push('\n'),
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_text_node {
                    let value = e.unescape().map_err(|err| anyhow!(err))?;
                    output.push_str(&value);
                }
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"w:t" => in_text_node = false,
                b"w:p" => output.push('\n'),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(err) => return Err(anyhow!("failed to parse DOCX XML: {}", err)),
            _ => {}
        }
    }

    Ok(output.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;
    use zip::{ZipWriter, write::SimpleFileOptions};

    const DOCUMENT_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:p><w:r><w:t>My summer</w:t></w:r></w:p><w:p><w:r><w:t xml:space="preserve">I goed </w:t></w:r><w:r><w:t>to the beach.</w:t></w:r></w:p></w:body></w:document>"#;

    #[test]
    fn reads_plain_text_trimmed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("essay.txt");
        fs::write(&path, "  I like apples.\n\n").unwrap();
        assert_eq!(read_document_text(&path).unwrap(), "I like apples.");
    }

    #[test]
    fn reads_docx_paragraphs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("essay.docx");
        let file = fs::File::create(&path).unwrap();
        let mut writer = ZipWriter::new(file);
        writer
            .start_file("word/document.xml", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(DOCUMENT_XML.as_bytes()).unwrap();
        writer.finish().unwrap();

        let text = read_document_text(&path).unwrap();
        assert_eq!(text, "My summer\nI goed to the beach.");
    }

    #[test]
    fn rejects_unknown_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("essay.png");
        fs::write(&path, [0u8; 4]).unwrap();
        let err = read_document_text(&path).unwrap_err();
        assert!(err.to_string().contains("unsupported file type"));
    }

    #[test]
    fn docx_tabs_and_breaks_become_whitespace() {
        let xml = r#"<w:document><w:body><w:p><w:r><w:t>a</w:t><w:tab/><w:t>b</w:t><w:br/><w:t>c</w:t></w:r></w:p></w:body></w:document>"#;
        assert_eq!(docx_xml_to_text(xml).unwrap(), "a\tb\nc");
    }
}
