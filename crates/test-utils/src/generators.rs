//! Synthetic GRIB2 writer.
//!
//! Produces structurally valid edition-2 messages with simple packing so the
//! decoder can be tested without network access or large sample files.
//! Grid templates 3.0 (lat/lon) and 3.30 (Lambert conformal) are supported;
//! products use template 4.0 and data template 5.0 with an optional bitmap.

use crate::fixtures::SoundingLevel;

/// Geometry written to section 3. Angles in degrees, Lambert spacing in metres.
#[derive(Debug, Clone, PartialEq)]
pub enum GridTemplate {
    LatLon {
        ni: u32,
        nj: u32,
        la1: f64,
        lo1: f64,
        la2: f64,
        lo2: f64,
        di: f64,
        dj: f64,
    },
    Lambert {
        nx: u32,
        ny: u32,
        la1: f64,
        lo1: f64,
        lov: f64,
        latin1: f64,
        latin2: f64,
        dx_m: f64,
        dy_m: f64,
    },
}

impl GridTemplate {
    pub fn dims(&self) -> (u32, u32) {
        match *self {
            GridTemplate::LatLon { ni, nj, .. } => (ni, nj),
            GridTemplate::Lambert { nx, ny, .. } => (nx, ny),
        }
    }

    fn num_points(&self) -> u32 {
        let (ni, nj) = self.dims();
        ni * nj
    }
}

/// The three isobaric fields the density-altitude lookup consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsobaricField {
    Temperature,
    Height,
    Humidity,
}

impl IsobaricField {
    pub const ALL: [IsobaricField; 3] = [
        IsobaricField::Temperature,
        IsobaricField::Height,
        IsobaricField::Humidity,
    ];

    /// (category, number) in discipline 0.
    pub fn parameter(self) -> (u8, u8) {
        match self {
            IsobaricField::Temperature => (0, 0),
            IsobaricField::Humidity => (1, 1),
            IsobaricField::Height => (3, 5),
        }
    }

    pub fn value(self, level: &SoundingLevel) -> f32 {
        match self {
            IsobaricField::Temperature => level.temperature_k as f32,
            IsobaricField::Height => level.height_m as f32,
            IsobaricField::Humidity => level.rh_percent as f32,
        }
    }
}

/// Builds one GRIB2 message.
#[derive(Debug, Clone)]
pub struct Grib2Builder {
    discipline: u8,
    center: u16,
    year: u16,
    month: u8,
    day: u8,
    hour: u8,
    grid: GridTemplate,
    scanning_mode: u8,
    param_category: u8,
    param_number: u8,
    level_type: u8,
    level_scale: i8,
    level_value: u32,
    forecast_hour: u32,
    data_values: Vec<f32>,
    missing: Vec<bool>,
}

impl Grib2Builder {
    /// Regular lat/lon grid scanned west to east, north to south from (la1, lo1).
    pub fn lat_lon(ni: u32, nj: u32, la1: f64, lo1: f64, di: f64, dj: f64) -> Self {
        let grid = GridTemplate::LatLon {
            ni,
            nj,
            la1,
            lo1,
            la2: la1 - dj * (nj.saturating_sub(1)) as f64,
            lo2: lo1 + di * (ni.saturating_sub(1)) as f64,
            di,
            dj,
        };
        Self::with_template(grid, 0b0000_0000)
    }

    /// 10x10 one-degree grid over the upper Midwest (48N..39N, 260E..269E).
    pub fn new_conus() -> Self {
        Self::lat_lon(10, 10, 48.0, 260.0, 1.0, 1.0)
    }

    /// A small Lambert grid with the HRRR projection constants, scanned
    /// west to east, south to north.
    pub fn lambert_hrrr(nx: u32, ny: u32) -> Self {
        let grid = GridTemplate::Lambert {
            nx,
            ny,
            la1: 21.138123,
            lo1: 237.280472,
            lov: 262.5,
            latin1: 38.5,
            latin2: 38.5,
            dx_m: 3000.0,
            dy_m: 3000.0,
        };
        Self::with_template(grid, 0b0100_0000)
    }

    fn with_template(grid: GridTemplate, scanning_mode: u8) -> Self {
        let n = grid.num_points() as usize;
        Self {
            discipline: 0,
            center: 7,
            year: 2024,
            month: 6,
            day: 1,
            hour: 12,
            grid,
            scanning_mode,
            param_category: 0,
            param_number: 0,
            level_type: 100,
            level_scale: 0,
            level_value: 100_000,
            forecast_hour: 1,
            data_values: vec![288.15; n],
            missing: vec![false; n],
        }
    }

    pub fn grid(&self) -> &GridTemplate {
        &self.grid
    }

    pub fn with_discipline(mut self, discipline: u8) -> Self {
        self.discipline = discipline;
        self
    }

    pub fn with_reference_time(mut self, year: u16, month: u8, day: u8, hour: u8) -> Self {
        self.year = year;
        self.month = month;
        self.day = day;
        self.hour = hour;
        self
    }

    pub fn with_forecast_hour(mut self, hour: u32) -> Self {
        self.forecast_hour = hour;
        self
    }

    pub fn with_scanning_mode(mut self, mode: u8) -> Self {
        self.scanning_mode = mode;
        self
    }

    pub fn with_parameter(mut self, category: u8, number: u8) -> Self {
        self.param_category = category;
        self.param_number = number;
        self
    }

    pub fn with_field(self, field: IsobaricField) -> Self {
        let (category, number) = field.parameter();
        self.with_parameter(category, number)
    }

    /// First fixed surface as written: type, decimal scale factor, scaled value.
    pub fn with_level(mut self, level_type: u8, scale: i8, value: u32) -> Self {
        self.level_type = level_type;
        self.level_scale = scale;
        self.level_value = value;
        self
    }

    /// Isobaric surface, written in Pa.
    pub fn with_isobaric_level(self, pressure_hpa: f64) -> Self {
        self.with_level(100, 0, (pressure_hpa * 100.0).round() as u32)
    }

    pub fn with_constant_value(mut self, value: f32) -> Self {
        self.data_values = vec![value; self.grid.num_points() as usize];
        self
    }

    /// Values in scan order.
    pub fn with_data(mut self, data: Vec<f32>) -> Self {
        self.data_values = data;
        self
    }

    /// Mark scan-order positions as missing; a bitmap section is written.
    pub fn with_missing(mut self, indices: &[usize]) -> Self {
        for &i in indices {
            if let Some(flag) = self.missing.get_mut(i) {
                *flag = true;
            }
        }
        self
    }

    /// Complete message bytes.
    pub fn build(&self) -> Vec<u8> {
        assert_eq!(
            self.data_values.len(),
            self.grid.num_points() as usize,
            "data length must match the grid"
        );

        let section1 = self.build_section1();
        let section3 = self.build_section3();
        let section4 = self.build_section4();
        let section5 = self.build_section5();
        let section6 = self.build_section6();
        let section7 = self.build_section7();

        let message_length = 16
            + section1.len()
            + section3.len()
            + section4.len()
            + section5.len()
            + section6.len()
            + section7.len()
            + 4;

        let mut message = Vec::with_capacity(message_length);
        message.extend_from_slice(b"GRIB");
        message.extend_from_slice(&[0, 0]);
        message.push(self.discipline);
        message.push(2);
        message.extend_from_slice(&(message_length as u64).to_be_bytes());
        message.extend_from_slice(&section1);
        message.extend_from_slice(&section3);
        message.extend_from_slice(&section4);
        message.extend_from_slice(&section5);
        message.extend_from_slice(&section6);
        message.extend_from_slice(&section7);
        message.extend_from_slice(b"7777");
        message
    }

    fn build_section1(&self) -> Vec<u8> {
        let mut section = Vec::with_capacity(21);
        section.extend_from_slice(&21u32.to_be_bytes());
        section.push(1);
        section.extend_from_slice(&self.center.to_be_bytes());
        section.extend_from_slice(&0u16.to_be_bytes()); // sub-centre
        section.push(2); // master table version
        section.push(1); // local table version
        section.push(1); // reference time is start of forecast
        section.extend_from_slice(&self.year.to_be_bytes());
        section.push(self.month);
        section.push(self.day);
        section.push(self.hour);
        section.push(0);
        section.push(0);
        section.push(0); // operational
        section.push(1); // forecast
        section
    }

    fn build_section3(&self) -> Vec<u8> {
        let (template_number, template) = match self.grid {
            GridTemplate::LatLon {
                ni,
                nj,
                la1,
                lo1,
                la2,
                lo2,
                di,
                dj,
            } => {
                let mut gd = earth_shape();
                gd.extend_from_slice(&ni.to_be_bytes());
                gd.extend_from_slice(&nj.to_be_bytes());
                gd.extend_from_slice(&0u32.to_be_bytes()); // basic angle
                gd.extend_from_slice(&0xFFFF_FFFFu32.to_be_bytes()); // subdivisions
                gd.extend_from_slice(&signed32(micro(la1)));
                gd.extend_from_slice(&signed32(micro(lo1)));
                gd.push(48); // resolution and component flags
                gd.extend_from_slice(&signed32(micro(la2)));
                gd.extend_from_slice(&signed32(micro(lo2)));
                gd.extend_from_slice(&(micro(di) as u32).to_be_bytes());
                gd.extend_from_slice(&(micro(dj) as u32).to_be_bytes());
                gd.push(self.scanning_mode);
                (0u16, gd)
            }
            GridTemplate::Lambert {
                nx,
                ny,
                la1,
                lo1,
                lov,
                latin1,
                latin2,
                dx_m,
                dy_m,
            } => {
                let mut gd = earth_shape();
                gd.extend_from_slice(&nx.to_be_bytes());
                gd.extend_from_slice(&ny.to_be_bytes());
                gd.extend_from_slice(&signed32(micro(la1)));
                gd.extend_from_slice(&signed32(micro(lo1)));
                gd.push(8); // resolution and component flags
                gd.extend_from_slice(&signed32(micro(latin1))); // LaD
                gd.extend_from_slice(&signed32(micro(lov)));
                gd.extend_from_slice(&((dx_m * 1000.0).round() as u32).to_be_bytes());
                gd.extend_from_slice(&((dy_m * 1000.0).round() as u32).to_be_bytes());
                gd.push(0); // projection centre flag
                gd.push(self.scanning_mode);
                gd.extend_from_slice(&signed32(micro(latin1)));
                gd.extend_from_slice(&signed32(micro(latin2)));
                gd.extend_from_slice(&signed32(micro(-90.0))); // southern pole latitude
                gd.extend_from_slice(&signed32(0)); // southern pole longitude
                (30u16, gd)
            }
        };

        let mut section = Vec::with_capacity(14 + template.len());
        section.extend_from_slice(&(14 + template.len() as u32).to_be_bytes());
        section.push(3);
        section.push(0); // source of grid definition
        section.extend_from_slice(&self.grid.num_points().to_be_bytes());
        section.push(0);
        section.push(0);
        section.extend_from_slice(&template_number.to_be_bytes());
        section.extend_from_slice(&template);
        section
    }

    fn build_section4(&self) -> Vec<u8> {
        let mut section = Vec::with_capacity(34);
        section.extend_from_slice(&34u32.to_be_bytes());
        section.push(4);
        section.extend_from_slice(&0u16.to_be_bytes()); // coordinate values
        section.extend_from_slice(&0u16.to_be_bytes()); // template 4.0
        section.push(self.param_category);
        section.push(self.param_number);
        section.push(2); // forecast
        section.push(0);
        section.push(0);
        section.extend_from_slice(&0u16.to_be_bytes());
        section.push(0);
        section.push(1); // hours
        section.extend_from_slice(&self.forecast_hour.to_be_bytes());
        section.push(self.level_type);
        section.push(signed8(self.level_scale));
        section.extend_from_slice(&self.level_value.to_be_bytes());
        section.push(255); // no second surface
        section.push(0);
        section.extend_from_slice(&0u32.to_be_bytes());
        section
    }

    fn present_values(&self) -> Vec<f32> {
        self.data_values
            .iter()
            .zip(&self.missing)
            .filter(|(_, &missing)| !missing)
            .map(|(&v, _)| v)
            .collect()
    }

    fn packing(&self) -> Packing {
        Packing::for_values(&self.present_values())
    }

    fn build_section5(&self) -> Vec<u8> {
        let packing = self.packing();
        let packed_points = self.present_values().len() as u32;

        let mut section = Vec::with_capacity(21);
        section.extend_from_slice(&21u32.to_be_bytes());
        section.push(5);
        section.extend_from_slice(&packed_points.to_be_bytes());
        section.extend_from_slice(&0u16.to_be_bytes()); // template 5.0
        section.extend_from_slice(&packing.reference.to_be_bytes());
        section.extend_from_slice(&signed16(packing.binary_scale));
        section.extend_from_slice(&signed16(0)); // decimal scale
        section.push(packing.bits);
        section.push(0); // floating point
        section
    }

    fn build_section6(&self) -> Vec<u8> {
        if !self.missing.iter().any(|&m| m) {
            let mut section = Vec::with_capacity(6);
            section.extend_from_slice(&6u32.to_be_bytes());
            section.push(6);
            section.push(255);
            return section;
        }

        let mut bitmap = vec![0u8; self.missing.len().div_ceil(8)];
        for (i, &missing) in self.missing.iter().enumerate() {
            if !missing {
                bitmap[i / 8] |= 0x80 >> (i % 8);
            }
        }

        let mut section = Vec::with_capacity(6 + bitmap.len());
        section.extend_from_slice(&(6 + bitmap.len() as u32).to_be_bytes());
        section.push(6);
        section.push(0);
        section.extend_from_slice(&bitmap);
        section
    }

    fn build_section7(&self) -> Vec<u8> {
        let packing = self.packing();
        let mut packed = Vec::new();
        if packing.bits > 0 {
            let scale = 2f64.powi(packing.binary_scale as i32);
            for v in self.present_values() {
                let x = ((v as f64 - packing.reference as f64) / scale)
                    .round()
                    .clamp(0.0, 65535.0) as u16;
                packed.extend_from_slice(&x.to_be_bytes());
            }
        }

        let mut section = Vec::with_capacity(5 + packed.len());
        section.extend_from_slice(&(5 + packed.len() as u32).to_be_bytes());
        section.push(7);
        section.extend_from_slice(&packed);
        section
    }
}

/// Simple-packing parameters for 16-bit values.
struct Packing {
    reference: f32,
    binary_scale: i16,
    bits: u8,
}

impl Packing {
    fn for_values(values: &[f32]) -> Self {
        let (min, max) = values
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        if values.is_empty() {
            return Self {
                reference: 0.0,
                binary_scale: 0,
                bits: 0,
            };
        }

        let range = max as f64 - min as f64;
        if range == 0.0 {
            return Self {
                reference: min,
                binary_scale: 0,
                bits: 0,
            };
        }

        // value = R + X * 2^E with X < 2^16
        Self {
            reference: min,
            binary_scale: (range / 65535.0).log2().ceil() as i16,
            bits: 16,
        }
    }
}

fn earth_shape() -> Vec<u8> {
    let mut gd = Vec::with_capacity(67);
    gd.push(6); // sphere of radius 6371229 m
    gd.extend_from_slice(&[0; 15]);
    gd
}

fn micro(degrees: f64) -> i64 {
    (degrees * 1e6).round() as i64
}

/// GRIB2 signed integers are sign-magnitude, not two's complement.
fn signed32(v: i64) -> [u8; 4] {
    let magnitude = (v.unsigned_abs() as u32) & 0x7FFF_FFFF;
    let raw = if v < 0 { magnitude | 0x8000_0000 } else { magnitude };
    raw.to_be_bytes()
}

fn signed16(v: i16) -> [u8; 2] {
    let magnitude = v.unsigned_abs() & 0x7FFF;
    let raw = if v < 0 { magnitude | 0x8000 } else { magnitude };
    raw.to_be_bytes()
}

fn signed8(v: i8) -> u8 {
    let magnitude = v.unsigned_abs() & 0x7F;
    if v < 0 {
        magnitude | 0x80
    } else {
        magnitude
    }
}

/// TMP, HGT and RH messages for every level of a sounding, each constant
/// over the template's grid.
pub fn isobaric_messages(template: &Grib2Builder, sounding: &[SoundingLevel]) -> Vec<u8> {
    isobaric_messages_with(template, sounding, |field, level, _| field.value(level))
}

/// Like [`isobaric_messages`] with per-cell values from `value(field, level, scan_index)`.
pub fn isobaric_messages_with<F>(template: &Grib2Builder, sounding: &[SoundingLevel], value: F) -> Vec<u8>
where
    F: Fn(IsobaricField, &SoundingLevel, usize) -> f32,
{
    let n = template.grid.num_points() as usize;
    let mut file = Vec::new();
    for level in sounding {
        for field in IsobaricField::ALL {
            let data = (0..n).map(|i| value(field, level, i)).collect();
            let message = template
                .clone()
                .with_field(field)
                .with_isobaric_level(level.pressure_hpa)
                .with_data(data)
                .build();
            file.extend_from_slice(&message);
        }
    }
    file
}

/// Values `row * 100 + col` in row-major order, handy for checking scan order.
pub fn create_index_grid(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            data.push((row * 100 + col) as f32);
        }
    }
    data
}
