//! Native GeoTIFF reading and writing

mod native;

pub use native::{
    read_multiband_geotiff, read_multiband_geotiff_from_buffer, write_geotiff,
    write_geotiff_to_buffer,
};
