use collocator::core::{AffineGeoCoding, CollocateOptions, Collocator, GeoCoding, ResamplingMethod};
use collocator::types::{Band, CollocError, Mask, Product, SampleCoding, SampleType, TiePointGrid};
use collocator::collocate;
use ndarray::Array2;
use std::sync::Arc;

const WAVELENGTHS: [f32; 15] = [
    412.6395569, 442.5160217, 489.8732910, 509.8299866, 559.7575684, 619.7247925, 664.7286987, 680.9848022,
    708.4989624, 753.5312500, 761.7092285, 778.5520020, 864.8800049, 884.8975830, 899.9100342,
];

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn add_flag_coding(product: &mut Product, name: &str) {
    let mut coding = SampleCoding::flag(name);
    coding.add_entry("INVALID", 1, "invalid description");
    product.add_flag_coding(coding).unwrap();
    let band = Band::new(name, SampleType::UInt32, Array2::zeros((16, 16))).with_sample_coding(name);
    product.add_band(band).unwrap();
}

fn add_index_coding(product: &mut Product, name: &str) {
    let mut coding = SampleCoding::index(name);
    coding.add_entry("CLASS_1", 1, "first class");
    coding.add_entry("CLASS_2", 2, "second class");
    product.add_index_coding(coding).unwrap();
    let band = Band::new(name, SampleType::UInt16, Array2::from_elem((16, 16), 1.0)).with_sample_coding(name);
    product.add_band(band).unwrap();
}

fn add_tie_point_grids(product: &mut Product) {
    for name in ["latitude", "longitude", "dem_altitude"] {
        product
            .add_tie_point_grid(TiePointGrid::new(name, Array2::zeros((16, 16))))
            .unwrap();
    }
}

/// 16x16 level-1 product on a 0.1 degree grid starting at (0, 0), radiance = col + row
fn create_master_product() -> Product {
    let mut product = Product::new("MER_RR_1P", "MER_RR_1P", 16, 16);
    for (i, wavelength) in WAVELENGTHS.iter().enumerate() {
        let data = Array2::from_shape_fn((16, 16), |(row, col)| (col + row) as f64);
        let mut band = Band::new(&format!("radiance_{}", i + 1), SampleType::Float32, data)
            .with_valid_pixel_expression("!l1_flags.INVALID && radiance_1 > 10");
        band.spectral_wavelength = *wavelength;
        band.spectral_band_index = Some(i as i32);
        product.add_band(band).unwrap();
    }
    add_flag_coding(&mut product, "l1_flags");
    add_index_coding(&mut product, "l1_class");
    add_tie_point_grids(&mut product);
    product.set_geocoding(Arc::new(AffineGeoCoding::north_up(0.0, 0.0, 0.1, 0.1).unwrap()));
    product
        .add_mask(Mask::new("bitmask", "radiance_1 > 10", [255, 0, 0], 0.5))
        .unwrap();
    product
}

/// 16x16 level-2 product shifted by (0.2, 0.2) degrees, reflectance = col * row
fn create_slave_product() -> Product {
    let mut product = Product::new("MER_RR_2P", "MER_RR_2P", 16, 16);
    for (i, wavelength) in WAVELENGTHS.iter().enumerate() {
        let data = Array2::from_shape_fn((16, 16), |(row, col)| (col * row) as f64);
        let mut band = Band::new(&format!("reflec_{}", i + 1), SampleType::Float32, data)
            .with_valid_pixel_expression("!l2_flags.INVALID && reflec_1 > 0.1");
        band.spectral_wavelength = *wavelength;
        band.spectral_band_index = Some(i as i32);
        product.add_band(band).unwrap();
    }
    add_flag_coding(&mut product, "l2_flags");
    add_index_coding(&mut product, "l2_class");
    add_tie_point_grids(&mut product);
    product.set_geocoding(Arc::new(AffineGeoCoding::north_up(0.2, 0.2, 0.1, 0.1).unwrap()));
    product
}

#[test]
fn test_collocate_output() {
    init_logger();
    let master = create_master_product();
    let slave = create_slave_product();

    let options = CollocateOptions::default();
    assert_eq!(options.target_product_type, "COLLOCATED");
    assert!(options.rename_master_components);
    assert!(options.rename_slave_components);
    assert_eq!(options.master_component_pattern, "${ORIGINAL_NAME}_M");
    assert_eq!(options.slave_component_pattern, "${ORIGINAL_NAME}_S");
    assert_eq!(options.resampling, ResamplingMethod::NearestNeighbour);

    let target = collocate(&master, &slave, &options).unwrap();

    assert_eq!(target.name, "MER_RR_1P");
    assert_eq!(target.product_type, "COLLOCATED");
    assert_eq!((target.width, target.height), (16, 16));
    assert_eq!(
        target.bands.len(),
        master.bands.len() + slave.bands.len() + slave.tie_point_grids.len()
    );
    assert_eq!(target.tie_point_grids.len(), master.tie_point_grids.len());

    let names: Vec<&str> = target.bands.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(names[0], "radiance_1_M");
    assert_eq!(names[1], "radiance_2_M");
    assert_eq!(names[15], "l1_flags_M");
    assert_eq!(names[16], "l1_class_M");
    assert_eq!(names[16 + 1], "reflec_1_S");
    assert_eq!(names[16 + 2], "reflec_2_S");
    assert_eq!(names[16 + 16], "l2_flags_S");
    assert_eq!(names[16 + 17], "l2_class_S");
    assert_eq!(names[16 + 17 + 1], "latitude_S");
    assert_eq!(names[16 + 17 + 2], "longitude_S");
    assert_eq!(names[16 + 17 + 3], "dem_altitude_S");
    assert!(target.tie_point_grid("dem_altitude_M").is_some());

    for i in [0, 1] {
        assert_eq!(
            target.bands[i].valid_pixel_expression.as_deref(),
            Some("!l1_flags_M.INVALID && radiance_1_M > 10")
        );
    }
    for i in [16 + 1, 16 + 2] {
        assert_eq!(
            target.bands[i].valid_pixel_expression.as_deref(),
            Some("!l2_flags_S.INVALID && reflec_1_S > 0.1")
        );
    }

    assert_eq!(target.masks.len(), 1);
    let mask = &target.masks[0];
    assert_eq!(mask.name, "bitmask_M");
    assert_eq!(mask.expression, "radiance_1_M > 10");
    assert_eq!(mask.color, [255, 0, 0]);
    assert!((mask.transparency - 0.5).abs() < 1e-5);

    assert_eq!(target.flag_codings.len(), 2);
    assert!(target.flag_coding("l1_flags_M").is_some());
    assert!(target.flag_coding("l2_flags_S").is_some());
    assert_eq!(target.index_codings.len(), 2);
    assert!(target.index_coding("l1_class_M").is_some());
    assert!(target.index_coding("l2_class_S").is_some());
    assert_eq!(target.band("l1_flags_M").unwrap().sample_coding.as_deref(), Some("l1_flags_M"));
    assert_eq!(target.band("l2_class_S").unwrap().sample_coding.as_deref(), Some("l2_class_S"));
}

#[test]
fn test_band_properties_carried_over() {
    let target = collocate(&create_master_product(), &create_slave_product(), &CollocateOptions::default()).unwrap();

    let reflec = target.band("reflec_3_S").unwrap();
    assert_eq!(reflec.spectral_wavelength, WAVELENGTHS[2]);
    assert_eq!(reflec.spectral_band_index, Some(2));
    assert_eq!(reflec.sample_type, SampleType::Float32);
    assert!(reflec.no_data_used);
    assert!(reflec.no_data_value.is_nan());

    let radiance = target.band("radiance_4_M").unwrap();
    assert_eq!(radiance.spectral_band_index, Some(3));
    assert_eq!(radiance.data[[3, 5]], 8.0);
    assert_eq!(target.band("l2_flags_S").unwrap().sample_type, SampleType::UInt32);
}

#[test]
fn test_nearest_neighbour_pixel_values() {
    let target = collocate(&create_master_product(), &create_slave_product(), &CollocateOptions::default()).unwrap();
    let reflec = &target.band("reflec_1_S").unwrap().data;

    // master (col, row) maps to slave (col - 2, row + 2)
    for row in 0..14 {
        for col in 2..16 {
            assert_eq!(reflec[[row, col]], ((col - 2) * (row + 2)) as f64, "pixel ({}, {})", col, row);
        }
    }
    // no slave counterpart
    assert!(reflec[[0, 0]].is_nan());
    assert!(reflec[[0, 1]].is_nan());
    assert!(reflec[[14, 5]].is_nan());
    assert!(reflec[[15, 15]].is_nan());
}

#[test]
fn test_missing_geocoding_is_configuration_error() {
    let master = create_master_product();
    let mut slave = Product::new("no_geo", "TEST", 16, 16);
    slave
        .add_band(Band::new("x", SampleType::Float32, Array2::zeros((16, 16))))
        .unwrap();

    let result = collocate(&master, &slave, &CollocateOptions::default());
    assert!(matches!(result, Err(CollocError::Configuration(_))));

    let result = collocate(&slave, &master, &CollocateOptions::default());
    assert!(matches!(result, Err(CollocError::Configuration(_))));
}

#[test]
fn test_renaming_disabled() {
    let options = CollocateOptions {
        rename_master_components: false,
        ..Default::default()
    };
    let target = collocate(&create_master_product(), &create_slave_product(), &options).unwrap();
    assert_eq!(target.bands[0].name, "radiance_1");
    assert_eq!(
        target.bands[0].valid_pixel_expression.as_deref(),
        Some("!l1_flags.INVALID && radiance_1 > 10")
    );
    assert!(target.mask("bitmask").is_some());
    assert!(target.flag_coding("l1_flags").is_some());
    assert!(target.band("reflec_1_S").is_some());

    // both sides keep "latitude", "longitude" and "dem_altitude"
    let options = CollocateOptions {
        rename_master_components: false,
        rename_slave_components: false,
        ..Default::default()
    };
    let result = collocate(&create_master_product(), &create_slave_product(), &options);
    assert!(matches!(result, Err(CollocError::Configuration(_))));
}

#[test]
fn test_invalid_pattern_rejected() {
    let options = CollocateOptions {
        slave_component_pattern: "slave".to_string(),
        ..Default::default()
    };
    assert!(matches!(Collocator::new(options), Err(CollocError::Configuration(_))));
}

#[test]
fn test_bilinear_promotes_integer_bands() {
    let options = CollocateOptions {
        resampling: ResamplingMethod::Bilinear,
        ..Default::default()
    };
    let collocator = Collocator::new(options).unwrap();
    let target = collocator
        .collocate(&create_master_product(), &create_slave_product())
        .unwrap();

    assert_eq!(target.band("l2_flags_S").unwrap().sample_type, SampleType::Float32);
    assert_eq!(target.band("l2_class_S").unwrap().sample_type, SampleType::Float32);
    assert_eq!(target.band("reflec_1_S").unwrap().sample_type, SampleType::Float32);
    // master bands are not resampled
    assert_eq!(target.band("l1_flags_M").unwrap().sample_type, SampleType::UInt32);

    // pixel centres map onto slave pixel centres, so bilinear reproduces the samples
    let reflec = &target.band("reflec_1_S").unwrap().data;
    assert!((reflec[[3, 5]] - 15.0).abs() < 1e-6);
}

#[test]
fn test_per_band_geocoding() {
    init_logger();
    let mut master = Product::new("master", "TEST", 4, 4);
    master.set_geocoding(Arc::new(AffineGeoCoding::north_up(0.0, 0.0, 1.0, 1.0).unwrap()));
    master
        .add_band(Band::new("m", SampleType::Float32, Array2::zeros((4, 4))))
        .unwrap();

    let scene: Arc<dyn GeoCoding> = Arc::new(AffineGeoCoding::north_up(0.0, 0.0, 1.0, 1.0).unwrap());
    // grid of "shifted" starts one degree east
    let shifted: Arc<dyn GeoCoding> = Arc::new(AffineGeoCoding::north_up(0.0, 1.0, 1.0, 1.0).unwrap());
    let values = Array2::from_shape_fn((4, 4), |(row, col)| (10 * row + col) as f64);

    let mut slave = Product::new("slave", "TEST", 4, 4);
    slave.set_geocoding(scene);
    slave
        .add_band(Band::new("plain", SampleType::Float32, values.clone()))
        .unwrap();
    slave
        .add_band(Band::new("shifted", SampleType::Float32, values.clone()).with_geocoding(shifted))
        .unwrap();
    assert!(!slave.is_using_single_geocoding());

    let target = collocate(&master, &slave, &CollocateOptions::default()).unwrap();
    assert_eq!(target.band("plain_S").unwrap().data, values);

    let shifted = &target.band("shifted_S").unwrap().data;
    for row in 0..4 {
        assert!(shifted[[row, 0]].is_nan());
        for col in 1..4 {
            assert_eq!(shifted[[row, col]], values[[row, col - 1]]);
        }
    }
}

#[test]
fn test_slave_no_data_preserved() {
    let mut master = Product::new("master", "TEST", 3, 1);
    master.set_geocoding(Arc::new(AffineGeoCoding::north_up(0.0, 0.0, 1.0, 1.0).unwrap()));

    let mut slave = Product::new("slave", "TEST", 3, 1);
    slave.set_geocoding(Arc::new(AffineGeoCoding::north_up(0.0, 1.0, 1.0, 1.0).unwrap()));
    let data = Array2::from_shape_vec((1, 3), vec![5.0, -1.0, 7.0]).unwrap();
    slave
        .add_band(Band::new("v", SampleType::Int16, data).with_no_data(-1.0))
        .unwrap();

    let target = collocate(&master, &slave, &CollocateOptions::default()).unwrap();
    let v = target.band("v_S").unwrap();
    assert_eq!(v.no_data_value, -1.0);
    assert!(v.no_data_used);
    assert_eq!(v.data.row(0).to_vec(), vec![-1.0, 5.0, -1.0]);
}
