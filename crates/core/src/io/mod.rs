//! Reading and writing geospatial files

mod geojson_io;
mod native;

pub use geojson_io::{read_geojson, read_geojson_str};
pub use native::{
    read_geotiff, read_geotiff_from_buffer, write_geotiff, write_geotiff_to_buffer,
    GeoTiffOptions, TiffCompression,
};
