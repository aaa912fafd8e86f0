//! collocator: geographic collocation of raster products
//!
//! Resamples a slave product onto the pixel grid of a master product,
//! merges their bands, codings and masks under collision-free names, and
//! provides lock-free elevation lookups on single-file DEMs.

use pyo3::prelude::*;
use pyo3::types::PyDict;
use pyo3::exceptions::{PyIOError, PyRuntimeError, PyValueError};
use numpy::ToPyArray;

pub mod types;
pub mod io;
pub mod core;

// Re-export main types
pub use types::{
    Band, CodingEntry, CodingKind, CollocError, CollocResult, GeoPos, GeoTransform, Mask, PixelPos, Product,
    SampleCoding, SampleType, TiePointGrid,
};
pub use crate::core::{
    collocate, AffineGeoCoding, CollocateOptions, Collocator, GeoCoding, RasterSampler, Resampling,
    ResamplingIndex, ResamplingMethod,
};
pub use io::{read_product, write_geotiff, ElevationModel, FileElevationModel};

fn to_py_err(err: CollocError) -> PyErr {
    match err {
        CollocError::Configuration(_) | CollocError::InvalidFormat(_) => PyValueError::new_err(err.to_string()),
        CollocError::Io(_) | CollocError::Gdal(_) | CollocError::DemRead(_) => PyIOError::new_err(err.to_string()),
        CollocError::Processing(_) => PyRuntimeError::new_err(err.to_string()),
    }
}

fn parse_method(name: &str) -> PyResult<ResamplingMethod> {
    name.parse::<ResamplingMethod>().map_err(to_py_err)
}

/// Python wrapper for FileElevationModel
#[pyclass(name = "ElevationModel")]
struct PyElevationModel {
    inner: FileElevationModel,
}

#[pymethods]
impl PyElevationModel {
    #[new]
    #[pyo3(signature = (path, resampling = "BILINEAR_INTERPOLATION", no_data_value = None))]
    fn new(path: String, resampling: &str, no_data_value: Option<f64>) -> PyResult<Self> {
        let method = parse_method(resampling)?;
        let inner = FileElevationModel::open(&path, method, no_data_value).map_err(to_py_err)?;
        Ok(PyElevationModel { inner })
    }

    /// Elevation at (lat, lon), the no-data value where there is none
    fn get_elevation(&self, lat: f64, lon: f64) -> PyResult<f64> {
        self.inner.get_elevation(&GeoPos::new(lat, lon)).map_err(to_py_err)
    }

    /// Raw sample at a pixel, NaN for no-data
    fn get_sample(&self, pixel_x: f64, pixel_y: f64) -> PyResult<f64> {
        if pixel_x < 0.0 || pixel_y < 0.0 {
            return Err(PyValueError::new_err(format!(
                "Negative pixel position ({}, {})",
                pixel_x, pixel_y
            )));
        }
        self.inner
            .get_sample(pixel_x as usize, pixel_y as usize)
            .map_err(to_py_err)
    }

    /// Pixel position (x, y) of a geographic position
    fn get_pixel_pos(&self, lat: f64, lon: f64) -> (f64, f64) {
        let pixel = self.inner.get_pixel_pos(&GeoPos::new(lat, lon));
        (pixel.x, pixel.y)
    }

    #[getter]
    fn no_data_value(&self) -> f64 {
        self.inner.no_data_value()
    }

    #[getter]
    fn width(&self) -> usize {
        self.inner.width()
    }

    #[getter]
    fn height(&self) -> usize {
        self.inner.height()
    }

    #[getter]
    fn resampling(&self) -> String {
        self.inner.resampling().method().to_string()
    }

    fn __repr__(&self) -> String {
        format!(
            "ElevationModel(source='{}', size={}x{}, resampling={})",
            self.inner.source(),
            self.inner.width(),
            self.inner.height(),
            self.inner.resampling().method()
        )
    }
}

/// Collocate two raster files and return the merged bands by name
#[pyfunction]
#[pyo3(signature = (master_path, slave_path, resampling = "NEAREST_NEIGHBOUR"))]
fn collocate_files(py: Python, master_path: String, slave_path: String, resampling: &str) -> PyResult<PyObject> {
    let options = CollocateOptions {
        resampling: parse_method(resampling)?,
        ..Default::default()
    };
    let master = read_product(&master_path).map_err(to_py_err)?;
    let slave = read_product(&slave_path).map_err(to_py_err)?;
    let target = collocate(&master, &slave, &options).map_err(to_py_err)?;

    let result = PyDict::new(py);
    for band in &target.bands {
        result.set_item(&band.name, band.data.to_pyarray(py))?;
    }
    Ok(result.into())
}

/// Python module definition
#[pymodule]
fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_class::<PyElevationModel>()?;
    m.add_function(wrap_pyfunction!(collocate_files, m)?)?;
    Ok(())
}
