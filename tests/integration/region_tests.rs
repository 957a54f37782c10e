//! Region reads end to end: whole images, tile-straddling windows, channel
//! normalization, pyramid levels, associated images, and failure modes.

use slidekit::{ImageError, ImageHandle, RegionRequest};

use super::test_utils::{gradient, open_mem, PageSpec, TiffBuilder};

fn rgb_32x24() -> Vec<u8> {
    TiffBuilder::new()
        .page(PageSpec::tiled(32, 24, 16, 3).pixels(gradient))
        .build()
}

#[tokio::test]
async fn whole_image_read_matches_the_source() {
    let image = open_mem(rgb_32x24()).await;
    let region = image
        .read_region(RegionRequest::new(0, 0, 32, 24))
        .await
        .unwrap();

    assert_eq!(region.shape(), &[24, 32, 3]);
    assert_eq!(region.size("XYC").unwrap(), vec![32, 24, 3]);
    assert_eq!(region.device(), "cpu");
    assert!(region.is_loaded());
    for y in 0..24u32 {
        for x in 0..32u32 {
            for c in 0..3u16 {
                let i = (y as usize * 32 + x as usize) * 3 + c as usize;
                assert_eq!(region.data()[i], gradient(x, y, c), "({x},{y},{c})");
            }
        }
    }
}

#[tokio::test]
async fn window_straddling_all_four_tiles() {
    let image = open_mem(rgb_32x24()).await;
    let region = image
        .read_region(RegionRequest::new(12, 10, 10, 10))
        .await
        .unwrap();

    assert_eq!(region.shape(), &[10, 10, 3]);
    for y in 0..10u32 {
        for x in 0..10u32 {
            let i = (y as usize * 10 + x as usize) * 3;
            assert_eq!(region.data()[i], gradient(x + 12, y + 10, 0));
        }
    }
}

#[tokio::test]
async fn gray_source_reads_as_rgba_with_opaque_alpha() {
    let data = TiffBuilder::new()
        .page(PageSpec::tiled(32, 32, 16, 1).pixels(|x, y, _| (x * 3 + y) as u8))
        .build();
    let image = open_mem(data).await;

    // Whole image
    let region = image
        .read_region(RegionRequest::new(0, 0, 32, 32))
        .await
        .unwrap();
    assert_eq!(region.shape(), &[32, 32, 4]);
    assert_eq!(region.channel_names(), &["R", "G", "B", "A"]);
    for y in 0..32u32 {
        for x in 0..32u32 {
            let gray = (x * 3 + y) as u8;
            let i = (y as usize * 32 + x as usize) * 4;
            assert_eq!(&region.data()[i..i + 4], &[gray, gray, gray, 0xFF]);
        }
    }

    // Sub-window crossing a tile boundary behaves the same way
    let sub = image
        .read_region(RegionRequest::new(14, 14, 4, 4))
        .await
        .unwrap();
    assert_eq!(sub.shape(), &[4, 4, 4]);
    let gray = (15 * 3 + 16) as u8;
    let i = (2 * 4 + 1) * 4;
    assert_eq!(&sub.data()[i..i + 4], &[gray, gray, gray, 0xFF]);
}

#[tokio::test]
async fn native_rgba_source_passes_stored_alpha_through() {
    let data = TiffBuilder::new()
        .page(PageSpec::tiled(32, 24, 16, 4).pixels(gradient))
        .build();
    let image = open_mem(data).await;

    assert_eq!(image.shape(), &[24, 32, 4]);
    assert_eq!(image.channel_names(), &["R", "G", "B", "A"]);

    // Crosses the tile boundary at x=16
    let region = image
        .read_region(RegionRequest::new(10, 4, 12, 8))
        .await
        .unwrap();
    assert_eq!(region.shape(), &[8, 12, 4]);
    for y in 0..8u32 {
        for x in 0..12u32 {
            for c in 0..4u16 {
                let i = (y as usize * 12 + x as usize) * 4 + c as usize;
                assert_eq!(region.data()[i], gradient(x + 10, y + 4, c), "({x},{y},{c})");
            }
        }
    }
}

#[tokio::test]
async fn channel_override_truncates_the_output() {
    let image = open_mem(rgb_32x24()).await;
    let region = image
        .read_region(RegionRequest::new(0, 0, 8, 8).with_channels(2))
        .await
        .unwrap();

    assert_eq!(region.shape(), &[8, 8, 2]);
    assert_eq!(region.channel_names(), &["R", "G"]);
    let i = (3 * 8 + 5) * 2;
    assert_eq!(region.data()[i], gradient(5, 3, 0));
    assert_eq!(region.data()[i + 1], gradient(5, 3, 1));
}

#[tokio::test]
async fn reads_from_a_lower_pyramid_level() {
    let data = TiffBuilder::new()
        .page(PageSpec::tiled(64, 48, 16, 3).pixels(|_, _, _| 1))
        .page(PageSpec::tiled(32, 24, 16, 3).pixels(gradient))
        .build();
    let image = open_mem(data).await;

    let region = image
        .read_region(RegionRequest::new(4, 6, 8, 8).at_level(1))
        .await
        .unwrap();
    assert_eq!(region.shape(), &[8, 8, 3]);
    for y in 0..8u32 {
        for x in 0..8u32 {
            let i = (y as usize * 8 + x as usize) * 3;
            assert_eq!(region.data()[i], gradient(x + 4, y + 6, 0));
        }
    }

    // Level-1 pixels are 2x level-0 pixels; the scoped origin reflects that
    assert_eq!(region.metadata().origin()[0], 8.0);
    assert_eq!(region.metadata().origin()[1], 12.0);

    let err = image
        .read_region(RegionRequest::new(0, 0, 4, 4).at_level(2))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ImageError::InvalidLevel { level: 2, level_count: 2 }
    ));
}

#[tokio::test]
async fn edge_reads_are_zero_padded() {
    let data = TiffBuilder::new()
        .page(PageSpec::tiled(32, 24, 16, 3).pixels(|_, _, _| 7))
        .build();
    let image = open_mem(data).await;

    let region = image
        .read_region(RegionRequest::new(28, -3, 8, 8))
        .await
        .unwrap();
    assert_eq!(region.shape(), &[8, 8, 3]);
    let at = |x: usize, y: usize| region.data()[(y * 8 + x) * 3];
    // Rows 0-2 are above the image, columns 4-7 are right of it
    assert_eq!(at(0, 0), 0);
    assert_eq!(at(0, 3), 7);
    assert_eq!(at(3, 3), 7);
    assert_eq!(at(4, 3), 0);
}

#[tokio::test]
async fn disjoint_reads_are_out_of_bounds() {
    let image = open_mem(rgb_32x24()).await;

    for (x, y, w, h) in [(32, 0, 4, 4), (0, 24, 4, 4), (-10, 0, 10, 10), (0, 0, 0, 4)] {
        let err = image
            .read_region(RegionRequest::new(x, y, w, h))
            .await
            .unwrap_err();
        assert!(matches!(err, ImageError::OutOfBounds { .. }), "({x},{y})");
    }
}

#[tokio::test]
async fn deflate_tiles_decode() {
    let data = TiffBuilder::new()
        .page(PageSpec::tiled(32, 24, 16, 3).pixels(gradient).deflate())
        .build();
    let image = open_mem(data).await;

    let region = image
        .read_region(RegionRequest::new(6, 6, 20, 12))
        .await
        .unwrap();
    for y in 0..12u32 {
        for x in 0..20u32 {
            let i = (y as usize * 20 + x as usize) * 3;
            assert_eq!(region.data()[i], gradient(x + 6, y + 6, 0));
        }
    }
}

#[tokio::test]
async fn truncated_tile_payload_fails_the_read() {
    // The first tile stores only 8 of its 16 rows; the read must fail
    // instead of compositing a partial tile.
    let data = TiffBuilder::new()
        .page(
            PageSpec::tiled(32, 24, 16, 3)
                .pixels(gradient)
                .truncate_first_chunk(16 * 8 * 3),
        )
        .build();
    let image = open_mem(data).await;

    let err = image
        .read_region(RegionRequest::new(0, 0, 32, 24))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ImageError::Decode { level: 0, tile_x: 0, tile_y: 0, .. }
    ));

    // Tiles outside the corrupted one still read cleanly
    let region = image
        .read_region(RegionRequest::new(16, 0, 16, 8))
        .await
        .unwrap();
    assert_eq!(region.data()[0], gradient(16, 0, 0));
}

#[tokio::test]
async fn associated_images_read_in_full() {
    let data = TiffBuilder::new()
        .page(PageSpec::tiled(64, 48, 16, 3).pixels(|_, _, _| 1))
        .page(PageSpec::stripped(20, 15, 4, 3).pixels(gradient))
        .page(
            PageSpec::tiled(16, 12, 16, 3)
                .pixels(|x, y, c| gradient(x, y, c).wrapping_add(1))
                .description("label 16x12"),
        )
        .build();
    let image = open_mem(data).await;

    // The unnamed strip page becomes the thumbnail; strips read like
    // full-width tiles.
    let thumb = image.associated_image("thumbnail").await.unwrap();
    assert_eq!(thumb.shape(), &[15, 20, 3]);
    for y in 0..15u32 {
        for x in 0..20u32 {
            let i = (y as usize * 20 + x as usize) * 3;
            assert_eq!(thumb.data()[i], gradient(x, y, 0));
        }
    }

    let label = image.associated_image("label").await.unwrap();
    assert_eq!(label.shape(), &[12, 16, 3]);
    assert_eq!(label.data()[0], gradient(0, 0, 0).wrapping_add(1));

    let err = image.associated_image("macro").await.unwrap_err();
    assert!(matches!(err, ImageError::UnknownAssociatedImage { name } if name == "macro"));
}

#[tokio::test]
async fn closed_handles_reject_reads() {
    let image = open_mem(rgb_32x24()).await;

    image.close();
    image.close(); // idempotent
    assert!(image.is_closed());

    let err = image
        .read_region(RegionRequest::new(0, 0, 4, 4))
        .await
        .unwrap_err();
    assert!(matches!(err, ImageError::ClosedHandle));

    let err = image.associated_image("thumbnail").await.unwrap_err();
    assert!(matches!(err, ImageError::ClosedHandle));

    // The descriptor stays readable after close
    assert_eq!(image.shape(), &[24, 32, 3]);
}

#[tokio::test]
async fn clones_share_the_closed_state() {
    let image = open_mem(rgb_32x24()).await;
    let clone = image.clone();
    image.close();
    assert!(clone.is_closed());
}

#[tokio::test]
async fn opens_from_a_file_on_disk() {
    let path = std::env::temp_dir().join(format!("slidekit-it-{}.tif", std::process::id()));
    std::fs::write(&path, rgb_32x24()).unwrap();

    let image = ImageHandle::open(&path).await.unwrap();
    assert_eq!(image.shape(), &[24, 32, 3]);
    let region = image
        .read_region(RegionRequest::new(10, 10, 6, 6))
        .await
        .unwrap();
    assert_eq!(region.data()[0], gradient(10, 10, 0));

    std::fs::remove_file(&path).ok();

    let missing = std::env::temp_dir().join("slidekit-it-does-not-exist.tif");
    let err = ImageHandle::open(&missing).await.unwrap_err();
    assert!(matches!(err, ImageError::Io(_)));
}
