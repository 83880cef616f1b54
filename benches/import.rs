//! Benchmarks for the collection import pipeline.
//!
//! Run with: cargo bench

use std::io::{Cursor, Write};
use std::time::Duration;

use criterion::{Criterion, criterion_group, criterion_main};

use stax::{
    Archive, ArchiveSource, Host, HostError, ImportOptions, ImportResult, MediaKind, run_import,
};

const MODULES: usize = 50;

/// A synthetic collection: 5 units of 10 modules, each with paragraphs,
/// a figure, and an equation.
fn build_archive() -> Vec<u8> {
    let mut manifest = String::from(
        r#"<col:collection xmlns:col="http://cnx.rice.edu/collxml" xmlns:md="http://cnx.rice.edu/mdml"><col:metadata><md:title>Bench Book</md:title></col:metadata><col:content>"#,
    );
    for unit in 0..5 {
        manifest.push_str(&format!(
            "<col:subcollection><md:title>Unit {unit}</md:title><col:content>"
        ));
        for module in 0..MODULES / 5 {
            manifest.push_str(&format!(
                "<col:module document=\"m{unit}_{module}\"/>"
            ));
        }
        manifest.push_str("</col:content></col:subcollection>");
    }
    manifest.push_str("</col:content></col:collection>");

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .start_file("col/collection.xml", zip::write::SimpleFileOptions::default())
        .unwrap();
    writer.write_all(manifest.as_bytes()).unwrap();

    for unit in 0..5 {
        for module in 0..MODULES / 5 {
            let id = format!("m{unit}_{module}");
            writer
                .start_file(
                    format!("col/{id}/index.cnxml"),
                    zip::write::SimpleFileOptions::default(),
                )
                .unwrap();
            let mut doc = format!(
                r#"<document xmlns="http://cnx.rice.edu/cnxml"><title>Module {id}</title><content>"#
            );
            for p in 0..20 {
                doc.push_str(&format!(
                    "<para>Paragraph {p} of {id}, long enough to exercise text handling.</para>"
                ));
            }
            doc.push_str(r#"<figure><media><image src="pic.png"/></media><caption>A figure.</caption></figure>"#);
            doc.push_str(r#"<equation><m:math xmlns:m="http://www.w3.org/1998/Math/MathML"><m:mi>x</m:mi></m:math></equation>"#);
            doc.push_str("</content></document>");
            writer.write_all(doc.as_bytes()).unwrap();

            writer
                .start_file(
                    format!("col/{id}/pic.png"),
                    zip::write::SimpleFileOptions::default(),
                )
                .unwrap();
            writer.write_all(&[0u8; 256]).unwrap();
        }
    }
    writer.finish().unwrap().into_inner()
}

struct NullHost;

impl Host for NullHost {
    fn fetch(&self, _url: &str, _timeout: Duration) -> Result<Vec<u8>, HostError> {
        Err(HostError::Network("no network in benches".into()))
    }

    fn persist_media(
        &self,
        _bytes: &[u8],
        _kind: MediaKind,
        origin: &str,
    ) -> Result<String, HostError> {
        Ok(format!("host:{origin}"))
    }

    fn emit_entities(&self, _result: &ImportResult) -> Result<(), HostError> {
        Ok(())
    }
}

fn bench_open_archive(c: &mut Criterion) {
    let bytes = build_archive();
    c.bench_function("open_archive", |b| {
        b.iter(|| Archive::from_bytes(bytes.clone()).unwrap());
    });
}

fn bench_import(c: &mut Criterion) {
    let bytes = build_archive();
    let file = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(file.path(), &bytes).unwrap();
    let source = ArchiveSource::Path(file.path().to_path_buf());

    c.bench_function("import_50_modules", |b| {
        b.iter(|| run_import(&source, &NullHost, &ImportOptions::default()).unwrap());
    });

    let serial = ImportOptions {
        workers: 1,
        ..ImportOptions::default()
    };
    c.bench_function("import_50_modules_serial", |b| {
        b.iter(|| run_import(&source, &NullHost, &serial).unwrap());
    });
}

criterion_group!(benches, bench_open_archive, bench_import);
criterion_main!(benches);
