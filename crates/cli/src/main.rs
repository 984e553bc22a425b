// Build spatial correlation maps from a coordinate-indexed feature table.
// corrmap: each cell against the summed vectors of its neighbors; ctmap: each cell against one reference vector.

use csv::{ReaderBuilder, WriterBuilder};
use env_logger::Env;
use flate2::{
    read::{GzDecoder, MultiGzDecoder},
    write::GzEncoder,
    Compression,
};
use log::{info, warn};
use ndarray::{Array1, ArrayD, Dimension, IxDyn};
use std::{
    collections::HashSet,
    env,
    error::Error,
    fs::File,
    io::{Cursor, Read},
    time::Instant,
};
use strum_macros::{Display, EnumString};
use tar::{Archive, Builder, Header};

use spatialcorr::{corrmap_with, ctmap_with, GridError, Harness};

#[derive(EnumString, Display, Clone, Copy)]
#[strum(ascii_case_insensitive)]
enum MapType {
    #[strum(serialize = "corrmap", serialize = "neighborhood", to_string = "corrmap")]
    Corrmap,
    #[strum(serialize = "ctmap", serialize = "reference", to_string = "ctmap")]
    Ctmap,
}

struct CliArgs {
    file_path: String,
    map_type: MapType,
    num_threads: Option<usize>,
    size: usize,
    dims: usize,
    reference: Option<String>,
    time_tracking: bool,
}

struct FeatureTable {
    coord_names: Vec<String>,
    features: Vec<String>,
    cells: Vec<(Vec<usize>, Vec<f64>)>,
}

fn parse_value(token: &str, line: usize, column: usize) -> Result<f64, GridError> {
    token.trim().parse().map_err(|_| {
        GridError::Type(format!(
            "cannot read '{}' as a number on line {}, column {}",
            token, line, column
        ))
    })
}

fn read_feature_table<R: Read>(reader: R, dims: usize) -> Result<FeatureTable, Box<dyn Error>> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .from_reader(reader);

    let header: Vec<String> = rdr.headers()?.iter().map(ToString::to_string).collect();
    if header.len() <= dims {
        return Err(format!(
            "Input header must contain {} coordinate columns followed by at least one feature",
            dims
        )
        .into());
    }
    let coord_names = header[..dims].to_vec();
    let features = header[dims..].to_vec();

    let mut seen = HashSet::new();
    let mut cells = Vec::new();
    for (idx, record) in rdr.records().enumerate() {
        let record = record?;
        let line = idx + 2; // header offset

        let mut coords = Vec::with_capacity(dims);
        for (column, token) in record.iter().take(dims).enumerate() {
            let coord: usize = token.trim().parse().map_err(|_| {
                format!(
                    "Invalid coordinate '{}' on line {}, column {}",
                    token,
                    line,
                    column + 1
                )
            })?;
            coords.push(coord);
        }

        if !seen.insert(coords.clone()) {
            return Err(format!("Duplicate coordinate {:?} encountered on line {}", coords, line).into());
        }

        let values = record
            .iter()
            .enumerate()
            .skip(dims)
            .map(|(column, token)| parse_value(token, line, column + 1))
            .collect::<Result<Vec<f64>, _>>()?;

        cells.push((coords, values));
    }

    if cells.is_empty() {
        return Err("Input file contains no grid cells".into());
    }

    Ok(FeatureTable {
        coord_names,
        features,
        cells,
    })
}

// Extents are max coordinate + 1 per axis; unlisted cells stay zero.
fn build_feature_grid(table: &FeatureTable) -> Result<ArrayD<f64>, Box<dyn Error>> {
    let dims = table.coord_names.len();
    let ngene = table.features.len();

    let mut extents = vec![0usize; dims];
    for (coords, _) in &table.cells {
        for (extent, &c) in extents.iter_mut().zip(coords) {
            *extent = (*extent).max(c + 1);
        }
    }
    let n_cells: usize = extents.iter().product();

    let mut data = vec![0.0; n_cells * ngene];
    for (coords, values) in &table.cells {
        let cell = coords
            .iter()
            .zip(&extents)
            .fold(0usize, |flat, (&c, &extent)| flat * extent + c);
        data[cell * ngene..(cell + 1) * ngene].copy_from_slice(values);
    }

    let mut shape = extents;
    shape.push(ngene);
    Ok(ArrayD::from_shape_vec(IxDyn(&shape), data)?)
}

fn read_reference<R: Read>(reader: R, features: &[String]) -> Result<Array1<f64>, Box<dyn Error>> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .from_reader(reader);

    let header: Vec<String> = rdr.headers()?.iter().map(ToString::to_string).collect();
    if header.len() == features.len() && header.as_slice() != features {
        warn!("Reference feature names differ from the input header; matching by position.");
    }

    let record = rdr
        .records()
        .next()
        .ok_or("Reference file contains no values")??;
    let values = record
        .iter()
        .enumerate()
        .map(|(column, token)| parse_value(token, 2, column + 1))
        .collect::<Result<Vec<f64>, _>>()?;

    Ok(Array1::from(values))
}

// Open plain, gzip, or the first file of a tar.gz archive and hand it to `parse`.
fn load_with<T, F>(file_path: &str, mut parse: F) -> Result<T, Box<dyn Error>>
where
    F: FnMut(&mut dyn Read) -> Result<T, Box<dyn Error>>,
{
    if file_path.ends_with(".tar.gz") {
        let file = File::open(file_path)?;
        let mut archive = Archive::new(GzDecoder::new(file));
        for entry in archive.entries()? {
            let mut entry = entry?;
            if entry.header().entry_type().is_file() {
                return parse(&mut entry);
            }
        }
        Err(format!("No readable file found in tar archive {}", file_path).into())
    } else if file_path.ends_with(".gz") {
        let file = File::open(file_path)?;
        parse(&mut MultiGzDecoder::new(file))
    } else {
        parse(&mut File::open(file_path)?)
    }
}

fn parse_args() -> Result<CliArgs, Box<dyn Error>> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        return Err("Usage: program <input_file> <map_type> [num_threads] [--size N] [--dims D] [--reference FILE] [--time]\nMap types: corrmap (neighborhood), ctmap (reference)\nnum_threads: number of threads to use (default: all available)\n--size: neighborhood radius for corrmap (default: 1)\n--dims: number of leading coordinate columns (default: 2)\n--reference: reference vector file, required for ctmap\n--time: enable detailed timing output".into());
    }

    let map_type: MapType = args[2].parse()?;

    let mut num_threads = None;
    let mut size = 1;
    let mut dims = 2;
    let mut reference = None;
    let mut time_tracking = false;

    let mut i = 3;
    while i < args.len() {
        let arg = &args[i];
        if arg == "--time" {
            time_tracking = true;
            i += 1;
        } else if arg == "--size" {
            let value = args.get(i + 1).ok_or("Missing value for --size")?;
            size = value.parse().map_err(|_| "Invalid --size value")?;
            i += 2;
        } else if let Some(value) = arg.strip_prefix("--size=") {
            size = value.parse().map_err(|_| "Invalid --size value")?;
            i += 1;
        } else if arg == "--dims" {
            let value = args.get(i + 1).ok_or("Missing value for --dims")?;
            dims = value.parse().map_err(|_| "Invalid --dims value")?;
            i += 2;
        } else if let Some(value) = arg.strip_prefix("--dims=") {
            dims = value.parse().map_err(|_| "Invalid --dims value")?;
            i += 1;
        } else if arg == "--reference" {
            let value = args.get(i + 1).ok_or("Missing value for --reference")?;
            reference = Some(value.clone());
            i += 2;
        } else if let Some(value) = arg.strip_prefix("--reference=") {
            reference = Some(value.to_string());
            i += 1;
        } else if let Ok(threads) = arg.parse::<usize>() {
            num_threads = Some(threads);
            i += 1;
        } else {
            return Err(format!("Unknown argument: {}", arg).into());
        }
    }

    if dims == 0 {
        return Err("--dims must be greater than 0".into());
    }
    if matches!(map_type, MapType::Corrmap) && !(2..=3).contains(&dims) {
        return Err("corrmap supports --dims 2 or 3 only".into());
    }
    if matches!(map_type, MapType::Ctmap) && reference.is_none() {
        return Err("ctmap requires --reference FILE".into());
    }

    Ok(CliArgs {
        file_path: args[1].clone(),
        map_type,
        num_threads,
        size,
        dims,
        reference,
        time_tracking,
    })
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = parse_args()?;

    let harness = Harness::new(cli.num_threads)?;
    if cli.num_threads.is_some() {
        info!("Using {} threads.", harness.ncores());
    } else {
        info!("Using all available CPU cores ({}).", harness.ncores());
    }

    // Data loading
    let load_start = cli.time_tracking.then(Instant::now);
    let table = load_with(&cli.file_path, |r| read_feature_table(r, cli.dims))?;
    let grid = build_feature_grid(&table)?;
    let reference = match &cli.reference {
        Some(path) => Some(load_with(path, |r| read_reference(r, &table.features))?),
        None => None,
    };
    let load_duration = load_start.map(|start| start.elapsed());

    if let Some(duration) = load_duration {
        info!(
            "Feature grid loaded in {:.3} seconds.",
            duration.as_secs_f64()
        );
    }
    info!(
        "Grid dimensions: {:?} cells x {} features",
        &grid.shape()[..cli.dims],
        table.features.len()
    );

    // Map calculation
    let calc_start = cli.time_tracking.then(Instant::now);
    let map = match cli.map_type {
        MapType::Corrmap => {
            info!("Computing neighborhood correlation map (radius {})...", cli.size);
            corrmap_with(&harness, &grid, cli.size)?
        }
        MapType::Ctmap => {
            info!("Computing reference correlation map...");
            let reference = reference.ok_or("ctmap requires --reference FILE")?;
            ctmap_with(&harness, &reference, &grid)?
        }
    };
    let calc_duration = calc_start.map(|start| start.elapsed());

    if let Some(duration) = calc_duration {
        info!(
            "{} calculated in {:.3} seconds.",
            cli.map_type,
            duration.as_secs_f64()
        );
    }

    // Output writing
    let output_start = cli.time_tracking.then(Instant::now);
    let mut csv_buf = Vec::<u8>::new();
    {
        let mut wtr = WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(&mut csv_buf);

        wtr.write_record(
            table
                .coord_names
                .iter()
                .map(String::as_str)
                .chain(std::iter::once("value")),
        )?;

        for (idx, &value) in map.indexed_iter() {
            let mut row: Vec<String> = idx.slice().iter().map(ToString::to_string).collect();
            row.push(value.to_string());
            wtr.write_record(&row)?;
        }
        wtr.flush()?;
    }

    let map_suffix = cli.map_type.to_string();

    // Extract base filename from input path
    let input_basename = std::path::Path::new(&cli.file_path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("data");

    // Remove .tar / .tsv left over from compound extensions
    let input_basename = input_basename
        .strip_suffix(".tar")
        .or_else(|| input_basename.strip_suffix(".tsv"))
        .unwrap_or(input_basename);

    let tar_gz_path = format!("{}_{}_map.tar.gz", input_basename, map_suffix);
    let tar_gz_file = File::create(&tar_gz_path)?;
    let enc = GzEncoder::new(tar_gz_file, Compression::default());
    let mut tar_builder = Builder::new(enc);

    let mut header = Header::new_gnu();
    header.set_size(csv_buf.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();

    let tsv_name = format!("{}_{}_map.tsv", input_basename, map_suffix);
    tar_builder.append_data(&mut header, tsv_name, &mut Cursor::new(csv_buf))?;
    tar_builder.finish()?;
    let output_duration = output_start.map(|start| start.elapsed());

    if let Some(duration) = output_duration {
        info!("Output written in {:.3} seconds.", duration.as_secs_f64());
    }
    info!("Map written to {}", tar_gz_path);

    if let (Some(load_dur), Some(calc_dur), Some(output_dur)) =
        (load_duration, calc_duration, output_duration)
    {
        let total_duration = load_dur + calc_dur + output_dur;

        info!("Data loading:     {:8.3} seconds", load_dur.as_secs_f64());
        info!("Map calculation:  {:8.3} seconds", calc_dur.as_secs_f64());
        info!("Output writing:   {:8.3} seconds", output_dur.as_secs_f64());
        info!("Total time:       {:8.3} seconds", total_duration.as_secs_f64());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_from(tsv: &str, dims: usize) -> Result<ArrayD<f64>, Box<dyn Error>> {
        let table = read_feature_table(tsv.as_bytes(), dims)?;
        build_feature_grid(&table)
    }

    #[test]
    fn sparse_table_fills_zeros_and_sizes_extents() {
        let tsv = "x\ty\tg1\tg2\n0\t0\t1.5\t2\n2\t1\t3\t-4\n";
        let table = read_feature_table(tsv.as_bytes(), 2).expect("valid table");
        assert_eq!(table.coord_names, vec!["x", "y"]);
        assert_eq!(table.features, vec!["g1", "g2"]);

        let grid = build_feature_grid(&table).expect("grid");
        assert_eq!(grid.shape(), &[3, 2, 2]);
        assert_eq!(grid[[0, 0, 0]], 1.5);
        assert_eq!(grid[[0, 0, 1]], 2.0);
        assert_eq!(grid[[2, 1, 0]], 3.0);
        assert_eq!(grid[[2, 1, 1]], -4.0);

        let listed = [[0usize, 0], [2, 1]];
        for x in 0..3 {
            for y in 0..2 {
                if !listed.contains(&[x, y]) {
                    assert_eq!(grid[[x, y, 0]], 0.0);
                    assert_eq!(grid[[x, y, 1]], 0.0);
                }
            }
        }
    }

    #[test]
    fn three_coordinate_columns_place_cells_row_major() {
        let tsv = "x\ty\tz\ta\tb\n\
                   1\t2\t0\t10\t11\n\
                   0\t0\t1\t20\t21\n\
                   1\t0\t1\t30\t31\n";
        let grid = grid_from(tsv, 3).expect("grid");
        assert_eq!(grid.shape(), &[2, 3, 2, 2]);
        assert_eq!(grid[[1, 2, 0, 0]], 10.0);
        assert_eq!(grid[[1, 2, 0, 1]], 11.0);
        assert_eq!(grid[[0, 0, 1, 0]], 20.0);
        assert_eq!(grid[[1, 0, 1, 1]], 31.0);
        assert_eq!(grid.iter().filter(|&&v| v != 0.0).count(), 6);

        // Flat layout: cell (1, 2, 0) sits at ((1 * 3) + 2) * 2 + 0 = 10.
        let flat = grid.as_slice().expect("standard layout");
        assert_eq!(&flat[10 * 2..10 * 2 + 2], &[10.0, 11.0]);
    }

    #[test]
    fn duplicate_coordinates_are_rejected() {
        let tsv = "x\ty\tg\n1\t1\t0.5\n0\t1\t0.1\n1\t1\t0.7\n";
        let err = read_feature_table(tsv.as_bytes(), 2)
            .err()
            .expect("duplicate must fail");
        let msg = err.to_string();
        assert!(msg.contains("Duplicate coordinate [1, 1]"), "{msg}");
        assert!(msg.contains("line 4"), "{msg}");
    }

    #[test]
    fn unparsable_value_is_a_type_error() {
        let tsv = "x\ty\tg1\tg2\n0\t0\t1.0\tabc\n";
        let err = read_feature_table(tsv.as_bytes(), 2)
            .err()
            .expect("bad number must fail");
        match err.downcast_ref::<GridError>() {
            Some(GridError::Type(msg)) => {
                assert!(msg.contains("'abc'") && msg.contains("line 2, column 4"), "{msg}")
            }
            other => panic!("expected a type error, got {:?}", other),
        }
    }

    #[test]
    fn header_without_features_is_rejected() {
        let tsv = "x\ty\n0\t0\n";
        assert!(read_feature_table(tsv.as_bytes(), 2).is_err());
        assert!(read_feature_table("x\ty\tg\n".as_bytes(), 2).is_err());
    }

    #[test]
    fn reference_reads_one_record() {
        let features = vec!["g1".to_string(), "g2".to_string(), "g3".to_string()];
        let reference =
            read_reference("g1\tg2\tg3\n0.5\t1\t-2\n".as_bytes(), &features).expect("reference");
        assert_eq!(reference.to_vec(), vec![0.5, 1.0, -2.0]);
        assert!(read_reference("g1\tg2\tg3\n".as_bytes(), &features).is_err());
    }
}
