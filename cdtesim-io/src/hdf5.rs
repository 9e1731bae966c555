//! HDF5 run output.
//!
//! Layout of a run file:
//!
//! | path | content |
//! |------|---------|
//! | `/events/*` | one row per recorded event; per-channel arrays are `(n, 384)` |
//! | `/events/hit*` | flattened hit ledgers, event `i` starts at `hit_index[i]` |
//! | `/inp/*`, `/source/*`, `/phys/*` | one dataset per column |
//! | `/hist/<name>/{edges,counts}` | 1-D histograms with title and entry attributes |
//! | `/hist/h2xy/{x_edges,y_edges,counts}` | 2-D hit map, counts are `(ny, nx)` |
//! | `/@metadata` | run metadata text |

use crate::{Error, Result};
use cdtesim_core::{
    EventRecord, Histogram1D, Histogram2D, IncidentParticleRecord, ProcessRecord, RunSink,
    SourceRecord, NUM_CHANNELS, NUM_MODULES,
};
use hdf5::types::{H5Type, VarLenUnicode};
use hdf5::{Dataset, File, Group};
use ndarray::{s, ArrayView1, ArrayView2};
use std::path::Path;
use std::str::FromStr;

const FORMAT_VERSION: &str = "0.1";

/// Dataset layout options for [`Hdf5RunSink`].
#[derive(Clone, Debug)]
pub struct Hdf5WriteOptions {
    /// Rows per chunk of the extendable tables; also the write buffer size.
    pub chunk_rows: usize,
    /// Deflate level, `None` for uncompressed datasets.
    pub compression: Option<u8>,
    /// Apply the shuffle filter before compression.
    pub shuffle: bool,
}

impl Default for Hdf5WriteOptions {
    fn default() -> Self {
        Self {
            chunk_rows: 4096,
            compression: Some(1),
            shuffle: true,
        }
    }
}

/// Run sink writing one HDF5 file.
pub struct Hdf5RunSink {
    file: File,
    events: EventTable,
    incident: IncidentTable,
    sources: SourceTable,
    processes: ProcessTable,
}

impl Hdf5RunSink {
    /// Creates the run file and its tables.
    ///
    /// # Errors
    /// Returns an error if the HDF5 file or datasets cannot be created.
    pub fn create<P: AsRef<Path>>(path: P, options: Hdf5WriteOptions) -> Result<Self> {
        if options.chunk_rows == 0 {
            return Err(Error::InvalidFormat("chunk_rows must be positive".to_string()));
        }
        let file = File::create(path)?;
        set_attr_str(&file, "cdtesim_format_version", FORMAT_VERSION)?;

        let events = EventTable::new(&file.create_group("events")?, &options)?;
        let incident = IncidentTable::new(&file.create_group("inp")?, &options)?;
        let sources = SourceTable::new(&file.create_group("source")?, &options)?;
        let processes = ProcessTable::new(&file.create_group("phys")?, &options)?;
        file.create_group(cdtesim_response::HISTOGRAM_DIRECTORY)?;

        Ok(Self {
            file,
            events,
            incident,
            sources,
            processes,
        })
    }

    fn histogram_group(&self, directory: &str, name: &str) -> Result<Group> {
        let parent = match self.file.group(directory) {
            Ok(group) => group,
            Err(_) => self.file.create_group(directory)?,
        };
        Ok(parent.create_group(name)?)
    }

    fn flush_tables(&mut self) -> Result<()> {
        self.events.flush()?;
        self.incident.flush()?;
        self.sources.flush()?;
        self.processes.flush()?;
        self.file.flush()?;
        Ok(())
    }
}

impl RunSink for Hdf5RunSink {
    fn write_event(&mut self, record: &EventRecord) -> cdtesim_core::Result<()> {
        self.events.append(record)?;
        Ok(())
    }

    fn write_incident(&mut self, record: &IncidentParticleRecord) -> cdtesim_core::Result<()> {
        self.incident.append(record)?;
        Ok(())
    }

    fn write_source(&mut self, record: &SourceRecord) -> cdtesim_core::Result<()> {
        self.sources.append(record)?;
        Ok(())
    }

    fn write_process(&mut self, record: &ProcessRecord) -> cdtesim_core::Result<()> {
        self.processes.append(record)?;
        Ok(())
    }

    fn write_histogram(
        &mut self,
        directory: &str,
        histogram: &Histogram1D,
    ) -> cdtesim_core::Result<()> {
        let group = self.histogram_group(directory, histogram.name())?;
        set_attr_str(&group, "title", histogram.title())?;
        set_attr(&group, "entries", histogram.entries())?;
        set_attr(&group, "underflow", histogram.underflow())?;
        set_attr(&group, "overflow", histogram.overflow())?;
        write_fixed_1d(&group, "edges", &histogram.axis().edges())?;
        write_fixed_1d(&group, "counts", histogram.contents())?;
        Ok(())
    }

    fn write_histogram_2d(
        &mut self,
        directory: &str,
        histogram: &Histogram2D,
    ) -> cdtesim_core::Result<()> {
        let group = self.histogram_group(directory, histogram.name())?;
        set_attr_str(&group, "title", histogram.title())?;
        set_attr(&group, "entries", histogram.entries())?;
        set_attr(&group, "out_of_range", histogram.out_of_range())?;
        write_fixed_1d(&group, "x_edges", &histogram.x_axis().edges())?;
        write_fixed_1d(&group, "y_edges", &histogram.y_axis().edges())?;

        let shape = (histogram.y_axis().bins(), histogram.x_axis().bins());
        let view = ArrayView2::from_shape(shape, histogram.contents())
            .map_err(|e| Error::InvalidFormat(format!("hit map shape mismatch: {e}")))?;
        let counts = group
            .new_dataset::<f64>()
            .shape(shape)
            .create("counts")
            .map_err(Error::from)?;
        counts.write(view).map_err(Error::from)?;
        Ok(())
    }

    fn write_metadata(&mut self, text: &str) -> cdtesim_core::Result<()> {
        set_attr_str(&self.file, "metadata", text)?;
        Ok(())
    }

    fn finish(&mut self) -> cdtesim_core::Result<()> {
        self.flush_tables()?;
        Ok(())
    }
}

/// Extendable dataset of rows `width` values wide, written in chunks.
struct Column<T: H5Type + Copy> {
    dataset: Dataset,
    width: usize,
    chunk_rows: usize,
    rows: usize,
    buffer: Vec<T>,
}

impl<T: H5Type + Copy> Column<T> {
    fn new(group: &Group, name: &str, width: usize, options: &Hdf5WriteOptions) -> Result<Self> {
        let mut builder = if width == 1 {
            group
                .new_dataset::<T>()
                .shape((0..,))
                .chunk((options.chunk_rows,))
        } else {
            group
                .new_dataset::<T>()
                .shape((0.., width))
                .chunk((options.chunk_rows, width))
        };
        if let Some(level) = options.compression {
            builder = builder.deflate(level);
        }
        if options.shuffle {
            builder = builder.shuffle();
        }
        Ok(Self {
            dataset: builder.create(name)?,
            width,
            chunk_rows: options.chunk_rows,
            rows: 0,
            buffer: Vec::with_capacity(options.chunk_rows * width),
        })
    }

    /// Appends whole rows; `values.len()` must be a multiple of the width.
    fn push(&mut self, values: &[T]) -> Result<()> {
        debug_assert_eq!(values.len() % self.width, 0);
        self.buffer.extend_from_slice(values);
        if self.buffer.len() >= self.chunk_rows * self.width {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let count = self.buffer.len() / self.width;
        let new_len = self.rows + count;
        if self.width == 1 {
            self.dataset.resize((new_len,))?;
            self.dataset
                .write_slice(ArrayView1::from(self.buffer.as_slice()), s![self.rows..new_len])?;
        } else {
            self.dataset.resize((new_len, self.width))?;
            let view = ArrayView2::from_shape((count, self.width), self.buffer.as_slice())
                .map_err(|e| Error::InvalidFormat(format!("row shape mismatch: {e}")))?;
            self.dataset.write_slice(view, s![self.rows..new_len, ..])?;
        }
        self.rows = new_len;
        self.buffer.clear();
        Ok(())
    }
}

struct EventTable {
    event_id: Column<i64>,
    edep: Column<f64>,
    sci: Column<i32>,
    collected: Column<f64>,
    charge: Column<f64>,
    charge2: Column<f64>,
    e0: Column<f64>,
    gun_pos: Column<f64>,
    gun_vec: Column<f64>,
    num_tracks: Column<u32>,
    n_hits: Column<u32>,
    total_steps: Column<u64>,
    r0: Column<f64>,
    length: Column<f64>,
    hit_index: Column<u64>,
    hit_x: Column<f64>,
    hit_y: Column<f64>,
    hit_z: Column<f64>,
    hit_energy: Column<f64>,
    hit_time: Column<f64>,
    hit_pdg: Column<i32>,
    hit_parent: Column<i32>,
    hit_pixel: Column<i32>,
    hits_written: u64,
}

impl EventTable {
    fn new(group: &Group, options: &Hdf5WriteOptions) -> Result<Self> {
        Ok(Self {
            event_id: Column::new(group, "eventID", 1, options)?,
            edep: Column::new(group, "edep", NUM_CHANNELS, options)?,
            sci: Column::new(group, "sci", NUM_CHANNELS, options)?,
            collected: Column::new(group, "collected", NUM_CHANNELS, options)?,
            charge: Column::new(group, "charge", NUM_CHANNELS, options)?,
            charge2: Column::new(group, "charge2", NUM_CHANNELS, options)?,
            e0: Column::new(group, "E0", 1, options)?,
            gun_pos: Column::new(group, "gunPos", 3, options)?,
            gun_vec: Column::new(group, "gunVec", 3, options)?,
            num_tracks: Column::new(group, "numTracks", 1, options)?,
            n_hits: Column::new(group, "nHits", NUM_MODULES, options)?,
            total_steps: Column::new(group, "totalNumSteps", 1, options)?,
            r0: Column::new(group, "R0", 1, options)?,
            length: Column::new(group, "L", 1, options)?,
            hit_index: Column::new(group, "hit_index", 1, options)?,
            hit_x: Column::new(group, "hitx", 1, options)?,
            hit_y: Column::new(group, "hity", 1, options)?,
            hit_z: Column::new(group, "hitz", 1, options)?,
            hit_energy: Column::new(group, "energy", 1, options)?,
            hit_time: Column::new(group, "time", 1, options)?,
            hit_pdg: Column::new(group, "pdg", 1, options)?,
            hit_parent: Column::new(group, "parent", 1, options)?,
            hit_pixel: Column::new(group, "pixel", 1, options)?,
            hits_written: 0,
        })
    }

    fn append(&mut self, r: &EventRecord) -> Result<()> {
        self.event_id.push(&[r.event_id])?;
        self.edep.push(&r.edep)?;
        self.sci.push(&r.sci)?;
        self.collected.push(&r.collected)?;
        self.charge.push(&r.charge)?;
        self.charge2.push(&r.realistic)?;
        self.e0.push(&[r.gun_energy_kev])?;
        self.gun_pos.push(&r.gun_position)?;
        self.gun_vec.push(&r.gun_direction)?;
        self.num_tracks.push(&[r.num_tracks])?;
        self.n_hits.push(&r.n_hits)?;
        self.total_steps.push(&[r.total_steps])?;
        let (r0, length) = r.near_surface.unwrap_or((f64::NAN, f64::NAN));
        self.r0.push(&[r0])?;
        self.length.push(&[length])?;

        let hits = &r.hits;
        self.hit_index.push(&[self.hits_written])?;
        self.hit_x.push(&hits.x)?;
        self.hit_y.push(&hits.y)?;
        self.hit_z.push(&hits.z)?;
        self.hit_energy.push(&hits.energy)?;
        self.hit_time.push(&hits.time)?;
        self.hit_pdg.push(&hits.pdg)?;
        self.hit_parent.push(&hits.parent)?;
        self.hit_pixel.push(&hits.pixel)?;
        self.hits_written += u64::try_from(hits.len()).unwrap_or(u64::MAX);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.event_id.flush()?;
        self.edep.flush()?;
        self.sci.flush()?;
        self.collected.flush()?;
        self.charge.flush()?;
        self.charge2.flush()?;
        self.e0.flush()?;
        self.gun_pos.flush()?;
        self.gun_vec.flush()?;
        self.num_tracks.flush()?;
        self.n_hits.flush()?;
        self.total_steps.flush()?;
        self.r0.flush()?;
        self.length.flush()?;
        self.hit_index.flush()?;
        self.hit_x.flush()?;
        self.hit_y.flush()?;
        self.hit_z.flush()?;
        self.hit_energy.flush()?;
        self.hit_time.flush()?;
        self.hit_pdg.flush()?;
        self.hit_parent.flush()?;
        self.hit_pixel.flush()
    }
}

struct IncidentTable {
    event_id: Column<i64>,
    pos: Column<f64>,
    e0: Column<f64>,
    itrack: Column<u32>,
    pixel_id: Column<i32>,
    detector_id: Column<i32>,
    v: Column<f64>,
    theta: Column<f64>,
    energy: Column<f64>,
    pdg: Column<i32>,
    parent: Column<i32>,
}

impl IncidentTable {
    fn new(group: &Group, options: &Hdf5WriteOptions) -> Result<Self> {
        Ok(Self {
            event_id: Column::new(group, "eventID", 1, options)?,
            pos: Column::new(group, "pos", 3, options)?,
            e0: Column::new(group, "E0", 1, options)?,
            itrack: Column::new(group, "itrack", 1, options)?,
            pixel_id: Column::new(group, "pixelID", 1, options)?,
            detector_id: Column::new(group, "detectorID", 1, options)?,
            v: Column::new(group, "v", 3, options)?,
            theta: Column::new(group, "theta", 1, options)?,
            energy: Column::new(group, "energy", 1, options)?,
            pdg: Column::new(group, "pdg", 1, options)?,
            parent: Column::new(group, "parent", 1, options)?,
        })
    }

    fn append(&mut self, r: &IncidentParticleRecord) -> Result<()> {
        self.event_id.push(&[r.event_id])?;
        self.pos.push(&r.position)?;
        self.e0.push(&[r.gun_energy_kev])?;
        self.itrack.push(&[r.track_index])?;
        self.pixel_id.push(&[r.pixel_id])?;
        self.detector_id.push(&[r.detector_id])?;
        self.v.push(&r.direction)?;
        self.theta.push(&[r.theta_deg])?;
        self.energy.push(&[r.energy_kev])?;
        self.pdg.push(&[r.pdg])?;
        self.parent.push(&[r.parent_id])
    }

    fn flush(&mut self) -> Result<()> {
        self.event_id.flush()?;
        self.pos.flush()?;
        self.e0.flush()?;
        self.itrack.flush()?;
        self.pixel_id.flush()?;
        self.detector_id.flush()?;
        self.v.flush()?;
        self.theta.flush()?;
        self.energy.flush()?;
        self.pdg.flush()?;
        self.parent.flush()
    }
}

struct SourceTable {
    event_id: Column<i64>,
    pos: Column<f64>,
    v: Column<f64>,
    energy: Column<f64>,
}

impl SourceTable {
    fn new(group: &Group, options: &Hdf5WriteOptions) -> Result<Self> {
        Ok(Self {
            event_id: Column::new(group, "eventID", 1, options)?,
            pos: Column::new(group, "pos", 3, options)?,
            v: Column::new(group, "v", 3, options)?,
            energy: Column::new(group, "energy", 1, options)?,
        })
    }

    fn append(&mut self, r: &SourceRecord) -> Result<()> {
        self.event_id.push(&[r.event_id])?;
        self.pos.push(&r.position)?;
        self.v.push(&r.direction)?;
        self.energy.push(&[r.energy_kev])
    }

    fn flush(&mut self) -> Result<()> {
        self.event_id.flush()?;
        self.pos.flush()?;
        self.v.flush()?;
        self.energy.flush()
    }
}

struct ProcessTable {
    process_type: Column<i32>,
    subtype: Column<i32>,
    e0: Column<f64>,
    pdg: Column<i32>,
    parent: Column<i32>,
}

impl ProcessTable {
    fn new(group: &Group, options: &Hdf5WriteOptions) -> Result<Self> {
        Ok(Self {
            process_type: Column::new(group, "type", 1, options)?,
            subtype: Column::new(group, "subType", 1, options)?,
            e0: Column::new(group, "E0", 1, options)?,
            pdg: Column::new(group, "pdg", 1, options)?,
            parent: Column::new(group, "parent", 1, options)?,
        })
    }

    fn append(&mut self, r: &ProcessRecord) -> Result<()> {
        self.process_type.push(&[r.process_type])?;
        self.subtype.push(&[r.process_subtype])?;
        self.e0.push(&[r.gun_energy_kev])?;
        self.pdg.push(&[r.pdg])?;
        self.parent.push(&[r.parent_id])
    }

    fn flush(&mut self) -> Result<()> {
        self.process_type.flush()?;
        self.subtype.flush()?;
        self.e0.flush()?;
        self.pdg.flush()?;
        self.parent.flush()
    }
}

fn write_fixed_1d<T: H5Type>(group: &Group, name: &str, data: &[T]) -> Result<()> {
    let dataset = group.new_dataset::<T>().shape((data.len(),)).create(name)?;
    dataset.write(ArrayView1::from(data))?;
    Ok(())
}

fn set_attr<T: H5Type>(location: &Group, name: &str, value: T) -> Result<()> {
    location.new_attr::<T>().create(name)?.write_scalar(&value)?;
    Ok(())
}

fn set_attr_str(location: &Group, name: &str, value: &str) -> Result<()> {
    let value = to_var_len_unicode(value)?;
    location
        .new_attr::<VarLenUnicode>()
        .create(name)?
        .write_scalar(&value)?;
    Ok(())
}

fn to_var_len_unicode(value: &str) -> Result<VarLenUnicode> {
    VarLenUnicode::from_str(value)
        .map_err(|e| Error::InvalidFormat(format!("invalid utf-8 attribute: {e}")))
}
