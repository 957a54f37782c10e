//! Metadata surface: dims, shape, dtype, channel naming, calibration,
//! resolutions, namespaces, and the raw serialization.

use slidekit::meta::{APERIO_NAMESPACE, METADATA_NAMESPACE, TIFF_NAMESPACE};
use slidekit::{ChannelPolicy, ImageError, ImageHandle, OpenOptions};

use super::test_utils::{gradient, open_mem, try_open_mem, PageSpec, TiffBuilder};
use slidekit::io::MemoryRangeReader;

fn rgb_32x24() -> Vec<u8> {
    TiffBuilder::new()
        .page(PageSpec::tiled(32, 24, 16, 3).pixels(gradient))
        .build()
}

#[tokio::test]
async fn describes_a_tiled_rgb_image() {
    let image = open_mem(rgb_32x24()).await;

    assert_eq!(image.dims(), "YXC");
    assert_eq!(image.ndim(), 3);
    assert_eq!(image.shape(), &[24, 32, 3]);
    assert_eq!(image.size("XYC").unwrap(), vec![32, 24, 3]);
    assert_eq!(image.size("XY").unwrap(), vec![32, 24]);

    let dtype = image.dtype();
    assert_eq!((dtype.code, dtype.bits, dtype.lanes), (1, 8, 1));
    assert_eq!(image.typestr(), "|u1");

    assert_eq!(image.channel_names(), &["R", "G", "B"]);
    assert_eq!(image.coord_sys(), "LPS");
    assert_eq!(image.origin(), [0.0, 0.0, 0.0]);
    assert_eq!(
        image.direction(),
        [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]
    );
    assert_eq!(image.device(), "cpu");
    assert!(!image.is_loaded());
}

#[tokio::test]
async fn default_calibration_is_unit_micrometers() {
    let image = open_mem(rgb_32x24()).await;

    assert_eq!(image.spacing(None).unwrap(), vec![1.0, 1.0, 1.0]);
    assert_eq!(image.spacing(Some("XY")).unwrap(), vec![1.0, 1.0]);
    assert_eq!(
        image.spacing_units(),
        &["micrometer", "micrometer", "color"]
    );
}

#[tokio::test]
async fn resolution_descriptor_covers_the_pyramid() {
    let data = TiffBuilder::new()
        .page(PageSpec::tiled(64, 48, 16, 3).pixels(gradient))
        .page(PageSpec::tiled(32, 24, 16, 3).pixels(gradient))
        .page(PageSpec::tiled(16, 12, 16, 3).pixels(gradient))
        .build();
    let image = open_mem(data).await;

    let res = image.resolutions();
    assert_eq!(res.level_count, 3);
    assert_eq!(res.level_dimensions, vec![(64, 48), (32, 24), (16, 12)]);
    assert_eq!(res.level_downsamples, vec![1.0, 2.0, 4.0]);
    assert_eq!(res.level_tile_sizes, vec![(16, 16), (16, 16), (16, 16)]);

    assert_eq!(image.best_level_for_downsample(1.0), 0);
    assert_eq!(image.best_level_for_downsample(2.0), 1);
    assert_eq!(image.best_level_for_downsample(3.0), 2);
    assert_eq!(image.best_level_for_downsample(100.0), 2);
}

#[tokio::test]
async fn metadata_namespaces_for_a_plain_tiff() {
    let image = open_mem(rgb_32x24()).await;

    let meta = image.metadata_map();
    assert_eq!(meta.len(), 2);
    assert!(meta.contains_key(METADATA_NAMESPACE));
    assert!(meta.contains_key(TIFF_NAMESPACE));

    let own = &meta[METADATA_NAMESPACE];
    assert_eq!(own["axes"], "YXC");
    assert_eq!(own["shape"][0], 24);
    assert_eq!(own["typestr"], "|u1");

    let tiff = &meta[TIFF_NAMESPACE];
    assert_eq!(tiff["ImageWidth"], 32);
    assert_eq!(tiff["ImageLength"], 24);
    assert_eq!(tiff["TileWidth"], 16);
    assert_eq!(tiff["SamplesPerPixel"], 3);
    assert_eq!(tiff["TileOffsets"]["count"], 4);
}

#[tokio::test]
async fn raw_metadata_serializes_axes_and_shape() {
    let image = open_mem(rgb_32x24()).await;
    assert_eq!(image.raw_metadata(), r#"{"axes":"YXC","shape":[24,32,3]}"#);
}

#[tokio::test]
async fn invalid_axis_orders_are_rejected() {
    let image = open_mem(rgb_32x24()).await;

    assert!(matches!(
        image.size("XZ"),
        Err(ImageError::InvalidAxis { axis: 'Z', .. })
    ));
    assert!(matches!(
        image.size("YY"),
        Err(ImageError::InvalidAxis { axis: 'Y', .. })
    ));
    assert!(matches!(
        image.spacing(Some("Q")),
        Err(ImageError::InvalidAxis { axis: 'Q', .. })
    ));
}

#[tokio::test]
async fn single_channel_source_is_advertised_as_rgba() {
    let data = TiffBuilder::new()
        .page(PageSpec::tiled(32, 32, 16, 1).pixels(|x, y, _| (x + y) as u8))
        .build();
    let image = open_mem(data).await;

    assert_eq!(image.shape(), &[32, 32, 4]);
    assert_eq!(image.channel_names(), &["R", "G", "B", "A"]);
    assert_eq!(image.raw_metadata(), r#"{"axes":"YXC","shape":[32,32,4]}"#);
}

#[tokio::test]
async fn native_policy_keeps_the_stored_channel_count() {
    let data = TiffBuilder::new()
        .page(PageSpec::tiled(32, 32, 16, 1).pixels(|x, y, _| (x + y) as u8))
        .build();
    let image = ImageHandle::from_reader(
        MemoryRangeReader::new(data, "mem://native"),
        OpenOptions::new().channel_policy(ChannelPolicy::Native),
    )
    .await
    .unwrap();

    assert_eq!(image.shape(), &[32, 32, 1]);
    assert_eq!(image.channel_names(), &["C0"]);
}

#[tokio::test]
async fn svs_description_feeds_spacing_and_namespace() {
    let description =
        "Aperio Image Library v12.0.0\n32x24 (16x16)|AppMag = 20|MPP = 0.25|Filename = demo";
    let data = TiffBuilder::new()
        .page(
            PageSpec::tiled(32, 24, 16, 3)
                .pixels(gradient)
                .description(description),
        )
        .build();
    let image = open_mem(data).await;

    assert_eq!(image.spacing(Some("XY")).unwrap(), vec![0.25, 0.25]);
    let svs = image.svs_properties().unwrap();
    assert_eq!(svs.magnification, Some(20.0));

    let meta = image.metadata_map();
    assert_eq!(meta.len(), 3);
    assert_eq!(meta[APERIO_NAMESPACE]["Filename"], "demo");
}

#[tokio::test]
async fn associated_images_are_listed_by_name() {
    let data = TiffBuilder::new()
        .page(PageSpec::tiled(64, 48, 16, 3).pixels(gradient))
        .page(PageSpec::stripped(20, 15, 8, 3).pixels(gradient))
        .page(
            PageSpec::tiled(16, 12, 16, 3)
                .pixels(gradient)
                .description("label 16x12"),
        )
        .build();
    let image = open_mem(data).await;

    assert_eq!(image.resolutions().level_count, 1);
    let names: Vec<&str> = image.associated_images().collect();
    assert_eq!(names, vec!["label", "thumbnail"]);
}

#[tokio::test]
async fn unsupported_compression_fails_at_open() {
    // Compression tag 5 = LZW
    let data = TiffBuilder::new()
        .page(PageSpec::tiled(32, 24, 16, 3).compression_tag(5))
        .build();
    let err = try_open_mem(data).await.unwrap_err();
    assert!(matches!(err, ImageError::UnsupportedFormat { .. }));
}

#[tokio::test]
async fn zero_count_dimension_tag_fails_as_corrupt_header() {
    // Hand-built little-endian TIFF whose only IFD entry is an ImageWidth
    // tag with count 0 and no value bytes.
    let mut data = vec![0x49, 0x49, 0x2A, 0x00];
    data.extend_from_slice(&8u32.to_le_bytes()); // first IFD offset
    data.extend_from_slice(&1u16.to_le_bytes()); // entry count
    data.extend_from_slice(&256u16.to_le_bytes()); // ImageWidth
    data.extend_from_slice(&3u16.to_le_bytes()); // SHORT
    data.extend_from_slice(&0u32.to_le_bytes()); // count 0
    data.extend_from_slice(&0u32.to_le_bytes()); // value field
    data.extend_from_slice(&0u32.to_le_bytes()); // next IFD

    let err = try_open_mem(data).await.unwrap_err();
    assert!(matches!(err, ImageError::CorruptHeader(_)));
}

#[tokio::test]
async fn garbage_bytes_fail_as_corrupt_header() {
    let err = try_open_mem(vec![0u8; 64]).await.unwrap_err();
    assert!(matches!(err, ImageError::CorruptHeader(_)));
}

#[tokio::test]
async fn strip_only_file_has_no_pyramid() {
    let data = TiffBuilder::new()
        .page(PageSpec::stripped(32, 24, 8, 3).pixels(gradient))
        .build();
    let err = try_open_mem(data).await.unwrap_err();
    assert!(matches!(err, ImageError::UnsupportedFormat { .. }));
}
