//! Integration tests for the raster engine crates.
//!
//! End-to-end coverage of the properties the engine guarantees across
//! crate boundaries: byte-identical round trips, allocator reuse and
//! growth, tile partitioning, and identical operation results across
//! backends. GPU cases run only when an adapter is present.

#[cfg(test)]
mod tests {
    use raster_core::{Bitmap, Curve, CurvePoint, PixelFormat, Rect32I, StdDynamicPoolAllocator};
    use raster_fx::{ApiBackendDevice, ApiImageObject, Device, ImageObject};
    use raster_ops::{BrightnessFilter, Filter};

    fn checkered_data(format: PixelFormat, width: i32, height: i32) -> Vec<u8> {
        let len = format.plane_byte_size(width as usize, height as usize);
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    // ========================================================================
    // Pixel format properties
    // ========================================================================

    #[test]
    fn test_pixel_size_identity_for_all_formats() {
        for format in PixelFormat::ALL {
            assert_eq!(
                format.pixel_size(),
                format.channel_count() * format.channel_size()
            );
        }
    }

    #[test]
    fn test_persisted_names_round_trip() {
        for format in PixelFormat::ALL {
            assert_eq!(PixelFormat::from_name(format.name()), Some(format));
        }
    }

    // ========================================================================
    // CPU backend round trips
    // ========================================================================

    #[test]
    fn test_upload_retrieve_round_trip_all_supported_formats() {
        let device = Device::new_cpu();

        for format in [
            PixelFormat::Rgb8,
            PixelFormat::Rgba8,
            PixelFormat::Rgb16,
            PixelFormat::Rgba16,
        ] {
            let data = checkered_data(format, 16, 16);
            let image = device
                .create_image_with_data(format, 16, 16, &data)
                .unwrap();

            let mut out = vec![0u8; data.len()];
            assert!(image.retrieve(&mut out));
            assert_eq!(out, data, "round trip broken for {format}");
        }
    }

    #[test]
    fn test_bitmap_round_trip_through_image_object() {
        let device = Device::new_cpu();

        let mut bitmap = Bitmap::new(PixelFormat::Rgba16, 8, 8).unwrap();
        bitmap
            .data_mut()
            .copy_from_slice(&checkered_data(PixelFormat::Rgba16, 8, 8));

        let mut image = device.create_image().unwrap();
        image.create_from_bitmap(&bitmap).unwrap();

        let mut out = Bitmap::new(PixelFormat::Rgba16, 8, 8).unwrap();
        assert!(image.retrieve_bitmap(&mut out));
        assert_eq!(out, bitmap);
    }

    #[test]
    fn test_unsupported_cpu_format_is_an_error() {
        let device = Device::new_cpu();
        assert!(device
            .create_image_sized(PixelFormat::Mono32F, 4, 4)
            .is_err());
    }

    #[test]
    fn test_same_device_copy_between_objects() {
        let device = Device::new_cpu();

        let data = checkered_data(PixelFormat::Rgb8, 8, 8);
        let source = device
            .create_image_with_data(PixelFormat::Rgb8, 8, 8, &data)
            .unwrap();
        let mut destination = device
            .create_image_sized(PixelFormat::Rgb8, 16, 16)
            .unwrap();

        assert!(destination.copy(&source, Rect32I::from_size(8, 8), 4, 4));

        let mut region = vec![0u8; data.len()];
        assert!(destination.retrieve_region(&mut region, Rect32I::new(4, 4, 8, 8)));
        assert_eq!(region, data);
    }

    // ========================================================================
    // Allocator behavior
    // ========================================================================

    #[test]
    fn test_reserve_serves_allocations_without_growth() {
        let pool = StdDynamicPoolAllocator::default();
        pool.reserve(4, 1024);

        let blobs: Vec<_> = (0..4).map(|_| pool.alloc(1000).unwrap()).collect();
        assert_eq!(pool.capacity(), 4, "reserve should cover four allocations");
        assert_eq!(pool.size(), 4);

        let fifth = pool.alloc(1000).unwrap();
        assert_eq!(
            pool.capacity(),
            12,
            "fifth allocation grows by the policy batch"
        );

        drop(fifth);
        drop(blobs);
        assert_eq!(pool.size(), 0);
        assert_eq!(pool.count_unused_of_size(1024), 12);
    }

    #[test]
    fn test_alloc_release_restores_counts() {
        let pool = StdDynamicPoolAllocator::default();
        pool.reserve(2, 512);

        let unused_before = pool.count_unused_of_size(512);
        let size_before = pool.size();

        let blob = pool.alloc(512).unwrap();
        drop(blob);

        assert_eq!(pool.count_unused_of_size(512), unused_before);
        assert_eq!(pool.size(), size_before);
    }

    #[test]
    fn test_device_shares_allocator_across_objects() {
        let device = Device::new_cpu();

        let a = device
            .create_image_sized(PixelFormat::Rgb8, 32, 32)
            .unwrap();
        let consumption = device.managed_memory_consumption();
        assert!(consumption >= 32 * 32 * 3);

        // destroying and recreating the same shape reuses the entry
        let mut a = a;
        assert!(device.destroy_image(&mut a));
        let _b = device
            .create_image_sized(PixelFormat::Rgb8, 32, 32)
            .unwrap();
        assert_eq!(device.managed_memory_consumption(), consumption);
    }

    // ========================================================================
    // Operations across the filter boundary
    // ========================================================================

    #[test]
    fn test_brightness_scenario_through_filter() {
        let device = Device::new_cpu();

        let mut data = Vec::new();
        for _ in 0..16 {
            data.extend_from_slice(&[10u8, 20, 30]);
        }

        let source = device
            .create_image_with_data(PixelFormat::Rgb8, 4, 4, &data)
            .unwrap();
        let mut destination = device
            .create_image_sized(PixelFormat::Rgb8, 4, 4)
            .unwrap();

        let area = Rect32I::from_size(4, 4);
        assert!(raster_ops::adjust_brightness(
            &device,
            &mut destination,
            &source,
            area,
            2.0
        ));

        let mut out = vec![0u8; data.len()];
        assert!(destination.retrieve(&mut out));
        for px in out.chunks(3) {
            assert_eq!(px, &[20, 40, 60]);
        }
    }

    #[test]
    fn test_curve_filter_end_to_end() {
        let device = Device::new_cpu();

        let data = checkered_data(PixelFormat::Rgba8, 8, 8);
        let source = device
            .create_image_with_data(PixelFormat::Rgba8, 8, 8, &data)
            .unwrap();
        let mut destination = device
            .create_image_sized(PixelFormat::Rgba8, 8, 8)
            .unwrap();

        let filter = BrightnessFilter::new(Curve::from_points(vec![
            CurvePoint::new(0.0, 0.1),
            CurvePoint::new(1.0, 0.9),
        ]));
        assert!(filter.process(&device, &mut destination, &source));

        // darkest inputs are lifted, brightest are pulled down;
        // alpha passes through untouched
        let mut out = vec![0u8; data.len()];
        assert!(destination.retrieve(&mut out));
        for (px, src_px) in out.chunks(4).zip(data.chunks(4)) {
            assert!(px[..3].iter().all(|&b| (20..=232).contains(&b)));
            assert_eq!(px[3], src_px[3]);
        }
    }

    #[test]
    fn test_operation_determinism_across_runs() {
        let device = Device::new_cpu();

        let data = checkered_data(PixelFormat::Rgb16, 33, 17);
        let source = device
            .create_image_with_data(PixelFormat::Rgb16, 33, 17, &data)
            .unwrap();

        let area = Rect32I::new(3, 2, 25, 13);
        let run = |device: &Device, source: &ImageObject| {
            let mut destination = device
                .create_image_sized(PixelFormat::Rgb16, 33, 17)
                .unwrap();
            assert!(raster_ops::adjust_brightness(
                device,
                &mut destination,
                source,
                area,
                0.73
            ));
            let mut out = vec![0u8; data.len()];
            assert!(destination.retrieve(&mut out));
            out
        };

        assert_eq!(run(&device, &source), run(&device, &source));
    }

    #[test]
    fn test_format_mismatch_fails_without_corruption() {
        let device = Device::new_cpu();

        let source = device
            .create_image_sized(PixelFormat::Rgba8, 4, 4)
            .unwrap();
        let mut destination = device
            .create_image_sized(PixelFormat::Rgb8, 4, 4)
            .unwrap();

        assert!(!raster_ops::adjust_brightness(
            &device,
            &mut destination,
            &source,
            Rect32I::from_size(4, 4),
            2.0
        ));

        let mut out = vec![0u8; 4 * 4 * 3];
        assert!(destination.retrieve(&mut out));
        assert!(out.iter().all(|&b| b == 0), "rejected op wrote pixels");
    }

    // ========================================================================
    // GPU backend (needs an adapter)
    // ========================================================================

    #[cfg(feature = "gpu")]
    mod gpu {
        use super::*;
        use raster_fx::backend::gpu::BackendDevice as GpuBackendDevice;

        fn gpu_device() -> Option<Device> {
            if !GpuBackendDevice::is_available() {
                return None;
            }
            Device::new_gpu().ok()
        }

        #[test]
        fn test_gpu_upload_retrieve_round_trip() {
            let Some(device) = gpu_device() else { return };

            for format in [PixelFormat::Rgb8, PixelFormat::Rgba8] {
                let data = checkered_data(format, 64, 64);
                let image = device
                    .create_image_with_data(format, 64, 64, &data)
                    .unwrap();

                let mut out = vec![0u8; data.len()];
                assert!(image.retrieve(&mut out));
                assert_eq!(out, data, "gpu round trip broken for {format}");
            }
        }

        #[test]
        fn test_tile_areas_partition_image() {
            let Some(device) = gpu_device() else { return };

            // larger than one tile in both directions
            let image = device
                .create_image_sized(PixelFormat::Rgba8, 2500, 1100)
                .unwrap();
            let image = match &image {
                ImageObject::Gpu(image) => image,
                _ => unreachable!(),
            };

            let mut covered = 0i64;
            let bounds = Rect32I::from_size(2500, 1100);

            for ty in 0..image.count_vertical_tiles() {
                for tx in 0..image.count_horizontal_tiles() {
                    let area = image.tile_area(tx, ty);
                    assert!(bounds.contains_rect(&area));
                    covered += area.area();

                    for oty in 0..image.count_vertical_tiles() {
                        for otx in 0..image.count_horizontal_tiles() {
                            if (otx, oty) != (tx, ty) {
                                assert!(
                                    area.intersect(&image.tile_area(otx, oty)).is_none(),
                                    "tiles overlap"
                                );
                            }
                        }
                    }
                }
            }

            assert_eq!(covered, bounds.area(), "tiles must cover the image exactly");
        }

        #[test]
        fn test_sub_area_tile_intersections_sum_exactly() {
            let Some(device) = gpu_device() else { return };

            let image = device
                .create_image_sized(PixelFormat::Rgba8, 2100, 1500)
                .unwrap();
            let image = match &image {
                ImageObject::Gpu(image) => image,
                _ => unreachable!(),
            };

            let area = Rect32I::new(513, 400, 1200, 900);
            let mut covered = 0i64;

            for ty in 0..image.count_vertical_tiles() {
                for tx in 0..image.count_horizontal_tiles() {
                    if let Some(hit) = image.tile_area(tx, ty).intersect(&area) {
                        covered += hit.area();
                    }
                }
            }

            assert_eq!(covered, area.area());
        }

        #[test]
        fn test_gpu_matches_cpu_brightness() {
            let Some(gpu_device) = gpu_device() else { return };
            let cpu_device = Device::new_cpu();

            let data = checkered_data(PixelFormat::Rgba8, 48, 32);
            let area = Rect32I::new(5, 3, 30, 20);

            let cpu_src = cpu_device
                .create_image_with_data(PixelFormat::Rgba8, 48, 32, &data)
                .unwrap();
            let mut cpu_dst = cpu_device
                .create_image_sized(PixelFormat::Rgba8, 48, 32)
                .unwrap();
            assert!(raster_ops::adjust_brightness(
                &cpu_device,
                &mut cpu_dst,
                &cpu_src,
                area,
                1.5
            ));

            let gpu_src = gpu_device
                .create_image_with_data(PixelFormat::Rgba8, 48, 32, &data)
                .unwrap();
            let mut gpu_dst = gpu_device
                .create_image_sized(PixelFormat::Rgba8, 48, 32)
                .unwrap();
            assert!(raster_ops::adjust_brightness(
                &gpu_device,
                &mut gpu_dst,
                &gpu_src,
                area,
                1.5
            ));
            gpu_device.synchronize();

            let mut cpu_out = vec![0u8; data.len()];
            let mut gpu_out = vec![0u8; data.len()];
            assert!(cpu_dst.retrieve(&mut cpu_out));
            assert!(gpu_dst.retrieve(&mut gpu_out));

            // identical results across backends, within one quantum of
            // the normalized math
            for (c, g) in cpu_out.iter().zip(&gpu_out) {
                assert!((*c as i32 - *g as i32).abs() <= 1, "{c} vs {g}");
            }
        }

        #[test]
        fn test_cross_backend_copy() {
            let Some(gpu_device) = gpu_device() else { return };
            let cpu_device = Device::new_cpu();

            let data = checkered_data(PixelFormat::Rgb8, 16, 16);
            let gpu_image = gpu_device
                .create_image_with_data(PixelFormat::Rgb8, 16, 16, &data)
                .unwrap();

            let mut cpu_image = cpu_device
                .create_image_sized(PixelFormat::Rgb8, 16, 16)
                .unwrap();
            assert!(cpu_image.copy(&gpu_image, Rect32I::from_size(16, 16), 0, 0));

            let mut out = vec![0u8; data.len()];
            assert!(cpu_image.retrieve(&mut out));
            assert_eq!(out, data);
        }
    }
}
