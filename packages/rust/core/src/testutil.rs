//! Fixtures shared by the orchestration tests.

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, StringFormat, dictionary};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use ocwharvest_fetcher::CourseDownload;
use ocwharvest_shared::{AppConfig, Result};
use ocwharvest_text::PdfConverter;

/// Converter that returns the same text for every PDF.
pub(crate) struct FixedPdf(pub &'static str);

impl PdfConverter for FixedPdf {
    fn convert(&self, _path: &Path) -> Result<String> {
        Ok(self.0.to_string())
    }
}

pub(crate) fn temp_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("ocwh-core-{}", Uuid::now_v7()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Config pointing every path under `root` and every endpoint at `server`.
pub(crate) fn test_config(root: &Path, server: &str) -> AppConfig {
    let mut config = AppConfig::default();
    config.defaults.corpus_dir = root.join("corpus").display().to_string();
    config.defaults.out_dir = root.join("out").display().to_string();
    config.defaults.database_path = root.join("harvest.db").display().to_string();
    config.catalog.api_url = format!("{server}/api/v0/search/");
    config.catalog.site_host = format!("{server}/");
    config.catalog.request_delay_ms = 0;
    config.catalog.search_timeout_secs = 5;
    config.catalog.page_timeout_secs = 5;
    config.catalog.archive_timeout_secs = 5;
    config
}

/// A one-page PDF.
pub(crate) fn pdf_bytes(text: &str) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 18.into()]),
            Operation::new("Td", vec![72.into(), 720.into()]),
            Operation::new(
                "Tj",
                vec![Object::String(text.as_bytes().to_vec(), StringFormat::Literal)],
            ),
            Operation::new("ET", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

pub(crate) fn zip_bytes<N: AsRef<str>>(entries: &[(N, Vec<u8>)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in entries {
        writer.start_file(name.as_ref(), SimpleFileOptions::default()).unwrap();
        writer.write_all(content).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

pub(crate) fn resource_manifest(file: &str, tags: &[&str]) -> Vec<u8> {
    json!({ "file": format!("/courses/sample/{file}"), "learning_resource_types": tags })
        .to_string()
        .into_bytes()
}

/// An archive with one complete problem set, one unpaired homework, two
/// lecture notes, and a reading whose payload is absent.
pub(crate) fn sample_course_zip(course_number: Option<&str>) -> Vec<u8> {
    let mut root = json!({
        "course_title": "Engineering Dynamics",
        "course_description": "Newtonian mechanics.",
        "year": 2011,
        "level": ["Undergraduate"],
        "term": "Fall",
        "topics": [["Engineering", "Mechanical Engineering", "Dynamics and Control"]],
        "instructors": [{ "first_name": "J. Kim", "last_name": "Vandiver" }],
        "learning_resource_types": ["Lecture Notes", "Problem Sets with Solutions"]
    });
    if let Some(number) = course_number {
        root["primary_course_number"] = json!(number);
    }

    let manifests = [
        ("hw01", "hw01.pdf", "Assignments"),
        ("hw01-sol", "hw01_sol.pdf", "Assignments"),
        ("hw02", "hw02.pdf", "Assignments"),
        ("lec01", "lec01.pdf", "Lecture Notes"),
        ("lec02", "lec02.pdf", "Lecture Notes"),
        ("reading", "r1.pdf", "Readings"),
        ("syllabus", "syllabus.txt", "Readings"),
    ];

    let mut entries: Vec<(String, Vec<u8>)> = vec![("data.json".into(), root.to_string().into_bytes())];
    for (dir, file, tag) in manifests {
        entries.push((format!("resources/{dir}/data.json"), resource_manifest(file, &[tag])));
    }
    for name in ["hw01.pdf", "hw01_sol.pdf", "hw02.pdf", "lec01.pdf", "lec02.pdf"] {
        entries.push((format!("static_resources/{name}"), pdf_bytes(name)));
    }
    entries.push(("static_resources/syllabus.txt".into(), b"Week 1\nWeek 2\n".to_vec()));

    zip_bytes(&entries)
}

/// Serve a download page and archive for `/courses/<slug>`.
pub(crate) async fn mount_course(server: &MockServer, slug: &str, archive: Vec<u8>) {
    let page = format!(
        r#"<html><body><a class="download" href="/courses/{slug}/{slug}.zip">Download course</a></body></html>"#
    );
    Mock::given(method("GET"))
        .and(path(format!("/courses/{slug}/download")))
        .respond_with(ResponseTemplate::new(200).set_body_string(page))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/courses/{slug}/{slug}.zip")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(archive))
        .mount(server)
        .await;
}

pub(crate) fn download_for(server: &MockServer, slug: &str) -> CourseDownload {
    CourseDownload {
        course_url: format!("{}/courses/{slug}", server.uri()),
        download_url: format!("{}/courses/{slug}/{slug}.zip", server.uri()),
    }
}
