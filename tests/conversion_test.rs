use std::path::PathBuf;

use image::GenericImageView;
use inkpress::error::{Error, Result};
use inkpress::pipeline::StepId;
use inkpress::prelude::*;
use inkpress::writer::dir::COVER_DIR;

mod common;
use common::{
    TEST_TIMEOUT, assert_valid_zip_file, cleanup_test_dir, create_page_file, create_zip_file,
    encode_png, page_image, read_zip_text, setup_test_dirs, zip_entry_names,
};

fn base_builder(source: PathBuf, target: PathBuf) -> InkpressConfigBuilder {
    let mut builder = InkpressConfig::builder();
    builder
        .title("Test Book")
        .source_path(source)
        .target_path(target)
        .device("K1")
        .workers(3usize);
    builder
}

fn fits_device(image: &image::DynamicImage) -> bool {
    let (width, height) = image.dimensions();
    width <= 600 && height <= 670 && (width == 600 || height == 670)
}

#[test]
fn test_builder_rejects_invalid_settings() {
    let err = InkpressConfig::builder().device("Nook").build().unwrap_err();
    assert!(err.to_string().contains("Unknown device"));

    let err = InkpressConfig::builder()
        .page_name_regex_str("page(\\d+")
        .build()
        .unwrap_err();
    assert!(err.to_string().contains("Invalid page_name_regex"));

    assert!(InkpressConfig::builder().workers(0usize).build().is_err());
    assert!(InkpressConfig::builder().gamma(-1.0).build().is_err());
    assert!(InkpressConfig::builder().gamma(f64::NAN).build().is_err());
    assert!(
        InkpressConfig::builder()
            .contrast_cutoff((5.0, 150.0))
            .build()
            .is_err()
    );
}

#[test]
fn test_builder_defaults() -> Result<()> {
    let config = InkpressConfig::builder().build()?;
    assert_eq!(config.title, "Untitled Conversion");
    assert_eq!(config.device, "KPW5");
    assert_eq!(config.output_format, OutputFormat::Epub);
    assert_eq!(config.read_direction, ReadDirection::Ltr);
    assert_eq!(config.crop_level, CropLevel::Normal);
    assert_eq!(config.encoding, ImageEncodingOptions::default());
    assert_eq!(config.workers, 10);
    assert!(config.gamma.is_none());
    Ok(())
}

#[tokio::test]
async fn test_preflight_check() -> Result<()> {
    let (test_dir, source_dir, target_dir) = setup_test_dirs("preflight").await;

    let config = base_builder(source_dir.join("missing"), target_dir.clone()).build()?;
    assert!(matches!(config.preflight_check(), Err(Error::NotFound(_))));

    let text_file = source_dir.join("notes.txt");
    tokio::fs::write(&text_file, b"not a book").await?;
    let config = base_builder(text_file, target_dir.clone()).build()?;
    assert!(matches!(
        config.preflight_check(),
        Err(Error::InvalidPath(_, _))
    ));

    let config = base_builder(source_dir.clone(), target_dir.clone())
        .title("  ")
        .build()?;
    assert!(matches!(config.preflight_check(), Err(Error::Config(_))));

    let config = base_builder(source_dir.clone(), PathBuf::new()).build()?;
    assert!(matches!(config.preflight_check(), Err(Error::Config(_))));

    let config = base_builder(source_dir, target_dir).build()?;
    assert!(config.preflight_check().is_ok());

    cleanup_test_dir(&test_dir).await;
    Ok(())
}

#[test]
fn test_pipeline_layout_follows_options() -> Result<()> {
    let source = PathBuf::from("source");
    let target = PathBuf::from("target");

    let config = base_builder(source.clone(), target.clone()).build()?;
    let pipeline = config.build_pipeline()?;
    assert_eq!(
        pipeline.image_step_ids(),
        vec![
            StepId::AutoCrop,
            StepId::CropOrRotate,
            StepId::Rescale,
            StepId::AutoContrast
        ]
    );
    assert_eq!(pipeline.pixel_step_ids(), vec![StepId::GrayScale]);

    let config = base_builder(source.clone(), target.clone())
        .add_margins(true)
        .rotate_pages(true)
        .build()?;
    assert_eq!(
        config.build_pipeline()?.image_step_ids(),
        vec![
            StepId::AutoCrop,
            StepId::CropOrRotate,
            StepId::MarginWrap,
            StepId::Rescale,
            StepId::AutoContrast
        ]
    );

    let config = base_builder(source, target)
        .add_margins(true)
        .colored_pages(true)
        .build()?;
    assert!(config.build_pipeline()?.pixel_step_ids().is_empty());
    assert_eq!(
        config.build_pipeline()?.image_step_ids(),
        vec![
            StepId::AutoCrop,
            StepId::MarginWrap,
            StepId::CropOrRotate,
            StepId::Rescale,
            StepId::AutoContrast
        ]
    );
    Ok(())
}

#[test]
fn test_derived_options() -> Result<()> {
    let source = PathBuf::from("source");
    let target = PathBuf::from("target");
    let profile = DeviceProfile::lookup("K1")?;

    let gray = base_builder(source.clone(), target.clone()).build()?;
    assert_eq!(gray.process_options(profile).gamma, 1.8);
    assert!(!gray.process_options(profile).apply_color);
    assert_eq!(gray.crop_palette(profile).len(), 4);

    let colored = base_builder(source.clone(), target.clone())
        .colored_pages(true)
        .crop_level(CropLevel::Aggressive)
        .build()?;
    assert_eq!(colored.process_options(profile).gamma, 1.0);
    assert!(colored.process_options(profile).apply_color);
    assert_eq!(colored.crop_palette(profile).len(), 2);

    let explicit = base_builder(source.clone(), target.clone())
        .gamma(0.5)
        .build()?;
    assert_eq!(explicit.process_options(profile).gamma, 0.5);

    let stretched = base_builder(source.clone(), target.clone())
        .stretch_pages(true)
        .build()?;
    assert!(stretched.allow_stretch());
    let padded = base_builder(source, target)
        .stretch_pages(true)
        .add_margins(true)
        .build()?;
    assert!(!padded.allow_stretch());
    Ok(())
}

#[tokio::test]
async fn test_convert_folder_to_cbz() -> Result<()> {
    let (test_dir, source_dir, target_dir) = setup_test_dirs("folder_to_cbz").await;
    create_page_file(&source_dir.join("001.png"), 300, 400).await?;
    create_page_file(&source_dir.join("002.png"), 400, 300).await?;
    create_page_file(&source_dir.join("003.png"), 300, 400).await?;

    let config = base_builder(source_dir, target_dir.clone())
        .output_format(OutputFormat::Cbz)
        .read_direction(ReadDirection::Rtl)
        .build()?;
    let reports = tokio::time::timeout(TEST_TIMEOUT, config.convert_from_source())
        .await
        .map_err(|_| Error::Timeout("conversion".to_string()))??;

    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report.name, "Test Book");
    assert_eq!(report.output_path, target_dir.join("Test Book.cbz"));
    assert_eq!(report.stats.submitted, 3);
    assert_eq!(report.stats.processed, 3);
    assert_eq!(report.stats.failed, 0);
    assert_eq!(report.stats.written, 4);

    assert_valid_zip_file(&report.output_path).await;
    assert_eq!(
        zip_entry_names(&report.output_path),
        vec![
            "page_0001.jpg",
            "page_0002.jpg",
            "page_0003.jpg",
            "page_0004.jpg",
            "ComicInfo.xml"
        ]
    );
    let info = read_zip_text(&report.output_path, "ComicInfo.xml");
    assert!(info.contains("<PageCount>4</PageCount>"));
    assert!(info.contains("<Manga>YesAndRightToLeft</Manga>"));

    let file = std::fs::File::open(&report.output_path)?;
    let mut archive = zip::ZipArchive::new(file)?;
    for index in 1..=4 {
        let mut bytes = Vec::new();
        std::io::Read::read_to_end(
            &mut archive.by_name(&format!("page_{:04}.jpg", index))?,
            &mut bytes,
        )?;
        let page = image::load_from_memory(&bytes)?;
        assert!(fits_device(&page), "page {} is {:?}", index, page.dimensions());
    }

    cleanup_test_dir(&test_dir).await;
    Ok(())
}

#[tokio::test]
async fn test_convert_archive_to_epub() -> Result<()> {
    let (test_dir, source_dir, target_dir) = setup_test_dirs("archive_to_epub").await;
    let archive = source_dir.join("volume.cbz");
    create_zip_file(
        &archive,
        &[
            ("pages/002.png", encode_png(&page_image(300, 400))),
            ("pages/001.png", encode_png(&page_image(300, 400))),
            ("__MACOSX/pages/._001.png", b"resource fork".to_vec()),
            ("pages/.thumb.png", b"hidden".to_vec()),
            ("pages/info.txt", b"scanned by someone".to_vec()),
        ],
    )?;

    let config = base_builder(archive, target_dir.clone())
        .title("Volume One")
        .output_format(OutputFormat::Epub)
        .build()?;
    let reports = tokio::time::timeout(TEST_TIMEOUT, config.convert_from_source())
        .await
        .map_err(|_| Error::Timeout("conversion".to_string()))??;

    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report.output_path, target_dir.join("Volume One.epub"));
    assert_eq!(report.stats.processed, 2);
    assert_eq!(report.stats.failed, 0);
    assert_eq!(report.stats.written, 2);

    assert_valid_zip_file(&report.output_path).await;
    let names = zip_entry_names(&report.output_path);
    assert!(names.iter().any(|name| name.ends_with("page_0001.xhtml")));
    assert!(names.iter().any(|name| name.ends_with("page_0002.xhtml")));
    assert!(!names.iter().any(|name| name.ends_with("page_0003.xhtml")));

    cleanup_test_dir(&test_dir).await;
    Ok(())
}

#[tokio::test]
async fn test_convert_mixed_folder_to_folders() -> Result<()> {
    let (test_dir, source_dir, target_dir) = setup_test_dirs("mixed_to_folder").await;
    create_page_file(&source_dir.join("001.png"), 300, 400).await?;
    for volume in ["vol10.zip", "vol2.cbz"] {
        create_zip_file(
            &source_dir.join(volume),
            &[("1.png", encode_png(&page_image(300, 400)))],
        )?;
    }

    let config = base_builder(source_dir, target_dir.clone())
        .output_format(OutputFormat::Folder)
        .colored_pages(true)
        .build()?;

    let books = config.discover_sources().await?;
    let names: Vec<&str> = books.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["Test Book", "vol2", "vol10"]);

    let reports = tokio::time::timeout(TEST_TIMEOUT, config.convert_from_source())
        .await
        .map_err(|_| Error::Timeout("conversion".to_string()))??;
    assert_eq!(reports.len(), 3);
    assert!(reports.iter().all(|report| report.stats.written == 1));

    // Each book's only page is promoted to the cover folder
    assert!(target_dir
        .join("Test Book")
        .join(COVER_DIR)
        .join("001.jpg")
        .is_file());
    assert!(target_dir.join("vol2").join(COVER_DIR).join("1.jpg").is_file());
    assert!(target_dir.join("vol10").join(COVER_DIR).join("1.jpg").is_file());

    cleanup_test_dir(&test_dir).await;
    Ok(())
}

#[tokio::test]
async fn test_empty_source_is_reported() -> Result<()> {
    let (test_dir, source_dir, target_dir) = setup_test_dirs("empty_source").await;
    tokio::fs::write(source_dir.join("readme.txt"), b"nothing here").await?;

    let config = base_builder(source_dir, target_dir).build()?;
    assert!(matches!(
        config.convert_from_source().await,
        Err(Error::NotFound(_))
    ));

    cleanup_test_dir(&test_dir).await;
    Ok(())
}
