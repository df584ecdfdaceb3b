//! Container lifecycle and image discovery on the local file system

use chrono::NaiveDate;
use ndarray::{ArrayD, IxDyn};
use serde_json::json;
use tempfile::TempDir;
use visor::{
    derived_image_name, ArrayConfig, ArraySubset, ChannelDescriptor, CompressionLevel,
    CompressionMethod, DataType, ImageAttributes, ManifestEntry, StackDescriptor, Vsr, VsrConfig,
    VsrError,
};

fn attributes(channels: &[&str]) -> ImageAttributes {
    let mut attributes = ImageAttributes::new(
        channels
            .iter()
            .enumerate()
            .map(|(i, c)| ChannelDescriptor::new(*c, i as u32))
            .collect(),
        vec![StackDescriptor::new("stack_1", 0)],
    );
    attributes.add_resolution("0", vec![1.0, 1.0, 2.5, 1.0, 1.0]);
    attributes.add_resolution("1", vec![1.0, 1.0, 5.0, 2.0, 2.0]);
    attributes
}

#[tokio::test]
async fn test_container_lifecycle() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("VISOR001.vsr");

    let err = Vsr::open(&root).await.unwrap_err();
    assert!(matches!(err, VsrError::NotFound(_)));

    Vsr::create(&root).await.unwrap();
    let err = Vsr::create(&root).await.unwrap_err();
    assert!(matches!(err, VsrError::AlreadyExists(_)));

    let manifest = std::fs::read_to_string(root.join("visor_raw_images/selected.json")).unwrap();
    assert_eq!(serde_json::from_str::<serde_json::Value>(&manifest).unwrap(), serde_json::json!([]));

    let vsr = Vsr::open(&root).await.unwrap();
    let info = vsr.info().await.unwrap();
    assert_eq!(info.image_types, vec!["raw"]);
    assert!(info.get("_comment").is_some());
}

#[tokio::test]
async fn test_suffix_checked_regardless_of_existence() {
    let temp_dir = TempDir::new().unwrap();
    let plain = temp_dir.path().join("VISOR001");
    std::fs::create_dir(&plain).unwrap();
    std::fs::write(plain.join("info.json"), "{}").unwrap();

    for path in [plain.clone(), temp_dir.path().join("missing")] {
        let err = Vsr::open(&path).await.unwrap_err();
        assert!(matches!(err, VsrError::InvalidFormat(_)));
    }

    // A file with the right suffix is not a container
    let file = temp_dir.path().join("file.vsr");
    std::fs::write(&file, "not a directory").unwrap();
    assert!(matches!(
        Vsr::open(&file).await.unwrap_err(),
        VsrError::NotFound(_)
    ));
}

#[tokio::test]
async fn test_info_keeps_stored_keys() {
    let temp_dir = TempDir::new().unwrap();
    let vsr = Vsr::create(temp_dir.path().join("VISOR001.vsr"))
        .await
        .unwrap();
    let mut document = vsr.info().await.unwrap().document;
    document.insert("sample".to_string(), serde_json::json!("mouse brain"));
    vsr.set_info(&document).await.unwrap();

    let info = vsr.info().await.unwrap();
    assert_eq!(info.get_str("sample"), Some("mouse brain"));
    let json = serde_json::to_value(&info).unwrap();
    assert_eq!(json["image_types"], serde_json::json!(["raw"]));
}

#[tokio::test]
async fn test_raw_collection_follows_manifest() {
    let temp_dir = TempDir::new().unwrap();
    let vsr = Vsr::create(temp_dir.path().join("VISOR001.vsr"))
        .await
        .unwrap();

    // Present on disk but not in the manifest: not listed
    vsr.create_image("raw", "slice_2_10x", attributes(&["488"]))
        .await
        .unwrap();
    assert!(vsr.image_collection("raw", None).await.unwrap().is_empty());

    vsr.create_image("raw", "slice_1_10x", attributes(&["488", "561"]))
        .await
        .unwrap();
    let mut entry = ManifestEntry::new("slice_1_10x", ["488", "561"]);
    entry
        .extra
        .insert("objective".to_string(), serde_json::json!("10x"));
    vsr.add_raw_image(entry).await.unwrap();

    let raw = vsr.image_collection("raw", None).await.unwrap();
    assert_eq!(raw.len(), 1);
    assert_eq!(raw[0].name, "slice_1_10x");
    assert_eq!(raw[0].channels, vec!["488", "561"]);
    assert_eq!(raw[0].resolutions["1"], vec![1.0, 1.0, 5.0, 2.0, 2.0]);
    assert_eq!(raw[0].extra["objective"], "10x");

    let err = vsr
        .add_raw_image(ManifestEntry::new("slice_1_10x", ["488"]))
        .await
        .unwrap_err();
    assert!(matches!(err, VsrError::AlreadyExists(_)));
}

#[tokio::test]
async fn test_derived_collection_is_scanned_live() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("VISOR001.vsr");
    let vsr = Vsr::create(&root).await.unwrap();

    let date = NaiveDate::from_ymd_opt(2024, 12, 1).unwrap();
    let name = derived_image_name("xxx", "slice_1_10x", date);
    assert_eq!(name, "xxx_slice_1_10x_20241201");

    let image = vsr
        .create_image("compr", &name, attributes(&["488"]))
        .await
        .unwrap();
    image
        .create_array(
            "0",
            &ArrayConfig::new(DataType::Uint16, vec![1, 1, 8, 8, 8], vec![1, 1, 8, 8, 8]),
        )
        .await
        .unwrap();

    let reader = Vsr::open(&root).await.unwrap();
    let compr = reader.image_collection("compr", None).await.unwrap();
    assert_eq!(compr.len(), 1);
    assert_eq!(compr[0].name, name);
    assert_eq!(compr[0].resolutions.len(), 2);

    // Written behind the library's back, visible on the next call
    let copied = root.join("visor_compr_images/yyy_slice_1_10x_20241202.zarr");
    std::fs::create_dir_all(&copied).unwrap();
    std::fs::copy(
        root.join("visor_compr_images")
            .join(format!("{}.zarr", name))
            .join("zarr.json"),
        copied.join("zarr.json"),
    )
    .unwrap();
    std::fs::create_dir_all(root.join("visor_compr_images/not_an_image")).unwrap();

    let compr = reader.image_collection("compr", None).await.unwrap();
    let names: Vec<_> = compr.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec![name.as_str(), "yyy_slice_1_10x_20241202"]);

    let all = reader.images(None).await.unwrap();
    assert_eq!(all.keys().collect::<Vec<_>>(), vec!["compr", "raw"]);
    assert_eq!(reader.info().await.unwrap().image_types, vec!["compr", "raw"]);
}

#[tokio::test]
async fn test_read_only_container_rejects_writes() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("VISOR001.vsr");
    Vsr::create(&root).await.unwrap();
    let vsr = Vsr::open(&root).await.unwrap();

    let err = vsr
        .create_image("raw", "slice_1_10x", attributes(&["488"]))
        .await
        .unwrap_err();
    assert!(matches!(err, VsrError::PermissionDenied(_)));
    let err = vsr
        .set_info(&serde_json::Map::new())
        .await
        .unwrap_err();
    assert!(matches!(err, VsrError::PermissionDenied(_)));
    assert!(!root.join("visor_raw_images/slice_1_10x.zarr").exists());
}

/// `zarr.json` as zarr-python writes it for `Image.write` defaults: 5-d
/// uint16, 2x2x2 chunks in 4x4x4 shards, blosc zstd level 5
fn sharded_blosc_array_document() -> serde_json::Value {
    json!({
        "shape": [1, 2, 4, 8, 8],
        "data_type": "uint16",
        "chunk_grid": {"name": "regular", "configuration": {"chunk_shape": [1, 1, 4, 4, 4]}},
        "chunk_key_encoding": {"name": "default", "configuration": {"separator": "/"}},
        "fill_value": 0,
        "codecs": [{
            "name": "sharding_indexed",
            "configuration": {
                "chunk_shape": [1, 1, 2, 2, 2],
                "codecs": [
                    {"name": "bytes", "configuration": {"endian": "little"}},
                    {"name": "blosc", "configuration": {
                        "typesize": 2, "cname": "zstd", "clevel": 5,
                        "shuffle": "shuffle", "blocksize": 0
                    }}
                ],
                "index_codecs": [
                    {"name": "bytes", "configuration": {"endian": "little"}},
                    {"name": "crc32c"}
                ],
                "index_location": "end"
            }
        }],
        "attributes": {},
        "zarr_format": 3,
        "node_type": "array",
        "storage_transformers": []
    })
}

#[tokio::test]
async fn test_open_sharded_blosc_array() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("VISOR001.vsr");
    let vsr = Vsr::create(&root).await.unwrap();
    vsr.create_image("raw", "slice_1_10x", attributes(&["488", "561"]))
        .await
        .unwrap();
    let array_dir = root.join("visor_raw_images/slice_1_10x.zarr/0");
    std::fs::create_dir_all(&array_dir).unwrap();
    std::fs::write(
        array_dir.join("zarr.json"),
        serde_json::to_vec_pretty(&sharded_blosc_array_document()).unwrap(),
    )
    .unwrap();

    let writer = Vsr::open_with_config(&root, VsrConfig::writable())
        .await
        .unwrap();
    let array = writer.open_array("raw", "slice_1_10x", "0").await.unwrap();
    assert_eq!(array.shape(), &[1, 2, 4, 8, 8]);
    assert_eq!(array.chunk_shape(), &[1, 1, 2, 2, 2]);
    assert_eq!(array.shard_shape(), Some(&[1u64, 1, 4, 4, 4][..]));
    assert_eq!(
        array.compression(),
        Some((CompressionMethod::Blosc, CompressionLevel::new(5)))
    );
    assert_eq!(array.read_all().await.unwrap().sum(), 0.0);

    let data = ArrayD::from_shape_vec(IxDyn(&[1, 2, 4, 8, 8]), (0..512u16).collect()).unwrap();
    array.write_ndarray(&[0; 5], &data).await.unwrap();
    assert!(array_dir.join("c/0/1/0/1/1").is_file());

    let reader = Vsr::open(&root).await.unwrap();
    let array = reader.open_array("raw", "slice_1_10x", "0").await.unwrap();
    let region: ArrayD<u16> = array
        .read_ndarray(&ArraySubset::from_ranges(&[0..1, 1..2, 3..4, 5..8, 6..7]))
        .await
        .unwrap();
    assert_eq!(region.shape(), &[1, 1, 1, 3, 1]);
    assert_eq!(region[[0, 0, 0, 2, 0]], data[[0, 1, 3, 7, 6]]);
}

#[tokio::test]
async fn test_default_array_layout_matches_pipeline() {
    let temp_dir = TempDir::new().unwrap();
    let vsr = Vsr::create(temp_dir.path().join("VISOR001.vsr"))
        .await
        .unwrap();
    let image = vsr
        .create_image("raw", "slice_1_10x", attributes(&["488", "561"]))
        .await
        .unwrap();
    let array = image
        .create_array(
            "0",
            &ArrayConfig::new(DataType::Uint16, vec![1, 2, 8, 8, 8], vec![1, 1, 2, 2, 2])
                .with_shard_shape(vec![1, 1, 4, 4, 4]),
        )
        .await
        .unwrap();
    assert_eq!(array.chunk_shape(), &[1, 1, 2, 2, 2]);
    assert_eq!(array.shard_shape(), Some(&[1u64, 1, 4, 4, 4][..]));
    assert_eq!(
        array.compression(),
        Some((CompressionMethod::Blosc, CompressionLevel::new(5)))
    );
}

#[tokio::test]
async fn test_list_images_by_channel() {
    let temp_dir = TempDir::new().unwrap();
    let vsr = Vsr::create(temp_dir.path().join("VISOR001.vsr"))
        .await
        .unwrap();
    vsr.create_image("raw", "slice_1_10x", attributes(&["488", "561"]))
        .await
        .unwrap();
    vsr.add_raw_image(ManifestEntry::new("slice_1_10x", ["488", "561"]))
        .await
        .unwrap();
    let name = derived_image_name("xxx", "slice_1_10x", NaiveDate::from_ymd_opt(2024, 12, 1).unwrap());
    vsr.create_image("compr", &name, attributes(&["405", "640"]))
        .await
        .unwrap();

    let by_channel = vsr.images(Some("488")).await.unwrap();
    assert_eq!(by_channel.keys().collect::<Vec<_>>(), vec!["compr", "raw"]);
    assert_eq!(by_channel["raw"].len(), 1);
    assert_eq!(by_channel["raw"][0].name, "slice_1_10x");
    assert_eq!(by_channel["raw"][0].channels, vec!["488", "561"]);
    assert!(by_channel["compr"].is_empty());

    let raw = vsr.image_collection("raw", Some("488")).await.unwrap();
    assert_eq!(raw.len(), 1);
    assert_eq!(raw[0].resolutions["0"], vec![1.0, 1.0, 2.5, 1.0, 1.0]);

    let compr = vsr.image_collection("compr", Some("640")).await.unwrap();
    assert_eq!(compr[0].name, name);
    assert!(vsr.image_collection("raw", Some("640")).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_manifest_stub_lists_no_raw_images() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("VISOR001.vsr");
    let vsr = Vsr::create(&root).await.unwrap();
    vsr.create_image("raw", "slice_1_10x", attributes(&["488"]))
        .await
        .unwrap();
    std::fs::write(
        root.join("visor_raw_images/selected.json"),
        r#"{"_comment": "see https://visor-tech.github.io/visor-data-schema/"}"#,
    )
    .unwrap();

    assert!(vsr.raw_manifest().await.unwrap().is_empty());
    assert!(vsr.image_collection("raw", None).await.unwrap().is_empty());
    vsr.add_raw_image(ManifestEntry::new("slice_1_10x", ["488"]))
        .await
        .unwrap();
    assert_eq!(vsr.image_collection("raw", Some("488")).await.unwrap().len(), 1);
}
