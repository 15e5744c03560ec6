//! GeoTIFF file roundtrips through a temporary directory.

use colordist_core::io::{read_multiband_geotiff, write_geotiff};
use colordist_core::{GeoTransform, MultibandRaster, Raster};
use std::fs::File;
use tiff::encoder::colortype::{Gray8, RGB8, RGBA8};
use tiff::encoder::TiffEncoder;

fn write_rgb(path: &std::path::Path, width: u32, height: u32, data: &[u8]) {
    let mut encoder = TiffEncoder::new(File::create(path).unwrap()).unwrap();
    encoder.write_image::<RGB8>(width, height, data).unwrap();
}

#[test]
fn rgb_file_is_read_band_major() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rgb.tif");

    // 2x2 image, pixel (r, c) = (10*r + c, 100, 200)
    let mut data = Vec::new();
    for r in 0..2u8 {
        for c in 0..2u8 {
            data.extend_from_slice(&[10 * r + c, 100, 200]);
        }
    }
    write_rgb(&path, 2, 2, &data);

    let img: MultibandRaster<f64> = read_multiband_geotiff(&path).unwrap();
    assert_eq!(img.n_bands(), 3);
    assert_eq!(img.shape(), (2, 2));
    assert_eq!(img.get(0, 1, 1).unwrap(), 11.0);
    assert_eq!(img.get(1, 0, 1).unwrap(), 100.0);
    assert_eq!(img.get(2, 1, 0).unwrap(), 200.0);
}

#[test]
fn rgba_and_gray_band_counts() {
    let dir = tempfile::tempdir().unwrap();

    let rgba_path = dir.path().join("rgba.tif");
    let mut encoder = TiffEncoder::new(File::create(&rgba_path).unwrap()).unwrap();
    encoder.write_image::<RGBA8>(3, 1, &[255u8; 12]).unwrap();
    let rgba: MultibandRaster<u8> = read_multiband_geotiff(&rgba_path).unwrap();
    assert_eq!(rgba.n_bands(), 4);

    let gray_path = dir.path().join("gray.tif");
    let mut encoder = TiffEncoder::new(File::create(&gray_path).unwrap()).unwrap();
    encoder.write_image::<Gray8>(3, 1, &[0u8, 127, 128]).unwrap();
    let gray: MultibandRaster<u8> = read_multiband_geotiff(&gray_path).unwrap();
    assert_eq!(gray.n_bands(), 1);
    assert_eq!(gray.get(0, 0, 2).unwrap(), 128);
}

#[test]
fn distance_map_roundtrip_keeps_georeference() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("distance.tif");

    let mut map: Raster<f64> = Raster::from_vec(vec![1.25; 35], 5, 7).unwrap();
    map.set(2, 3, 42.0).unwrap();
    map.set_transform(GeoTransform::new(10.0, 20.0, 0.5, -0.5));
    write_geotiff(&map, &path).unwrap();

    let back: MultibandRaster<f64> = read_multiband_geotiff(&path).unwrap();
    assert_eq!(back.n_bands(), 1);
    assert_eq!(back.shape(), (5, 7));
    assert!((back.get(0, 2, 3).unwrap() - 42.0).abs() < 1e-6);
    assert!((back.get(0, 0, 0).unwrap() - 1.25).abs() < 1e-6);
    assert_eq!(*back.transform(), GeoTransform::new(10.0, 20.0, 0.5, -0.5));
}

#[test]
fn missing_file_is_io_error() {
    let result: colordist_core::Result<MultibandRaster<f64>> =
        read_multiband_geotiff("/definitely/not/here.tif");
    assert!(matches!(result, Err(colordist_core::Error::Io(_))));
}
