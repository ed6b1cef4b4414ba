//! Only included in test

use std::{
    fs,
    path::{Path, PathBuf},
};

use checkrunner::{CheckRunner, Collector, Event, ProtocolValidator, Reporter};
use write_fonts::{
    tables::{
        fvar::{AxisInstanceArrays, Fvar, InstanceRecord, VariationAxisRecord},
        head::Head,
        hhea::Hhea,
        hmtx::Hmtx,
        maxp::Maxp,
        vmtx::LongMetric,
    },
    types::{Fixed, Tag},
    FontBuilder as TableBuilder,
};

use crate::font::TtFont;

/// Assembles just enough of a font for our checks to read.
#[derive(Debug, Clone)]
pub(crate) struct FontBuilder {
    upm: u16,
    advances: Vec<u16>,
    num_glyphs: Option<u16>,
    fs_type: u16,
    x_avg_char_width: Option<i16>,
    instances: Option<u16>,
}

impl FontBuilder {
    pub(crate) fn new() -> Self {
        FontBuilder {
            upm: 1000,
            advances: vec![500, 600],
            num_glyphs: None,
            fs_type: 0,
            x_avg_char_width: None,
            instances: None,
        }
    }

    pub(crate) fn upm(mut self, upm: u16) -> Self {
        self.upm = upm;
        self
    }

    /// Long metrics; glyphs beyond these share the last advance.
    pub(crate) fn advances(mut self, advances: &[u16]) -> Self {
        self.advances = advances.to_vec();
        self
    }

    pub(crate) fn num_glyphs(mut self, num_glyphs: u16) -> Self {
        self.num_glyphs = Some(num_glyphs);
        self
    }

    pub(crate) fn fs_type(mut self, fs_type: u16) -> Self {
        self.fs_type = fs_type;
        self
    }

    /// Defaults to the correct average of the advances.
    pub(crate) fn x_avg_char_width(mut self, value: i16) -> Self {
        self.x_avg_char_width = Some(value);
        self
    }

    /// Make it variable, with a weight axis and this many named instances.
    pub(crate) fn fvar(mut self, instances: u16) -> Self {
        self.instances = Some(instances);
        self
    }

    fn os2(&self) -> Vec<u8> {
        let x_avg_char_width = self.x_avg_char_width.unwrap_or_else(|| {
            let widths: Vec<_> = self.advances.iter().filter(|w| **w > 0).collect();
            let sum: u32 = widths.iter().map(|w| **w as u32).sum();
            (sum as f64 / widths.len().max(1) as f64).round() as i16
        });
        // version 4 is 96 bytes, we only fill in what we read
        let mut os2 = vec![0u8; 96];
        os2[0..2].copy_from_slice(&4u16.to_be_bytes());
        os2[2..4].copy_from_slice(&x_avg_char_width.to_be_bytes());
        os2[4..6].copy_from_slice(&400u16.to_be_bytes());
        os2[6..8].copy_from_slice(&5u16.to_be_bytes());
        os2[8..10].copy_from_slice(&self.fs_type.to_be_bytes());
        os2
    }

    pub(crate) fn build(&self) -> Vec<u8> {
        let num_glyphs = self
            .num_glyphs
            .unwrap_or(self.advances.len() as u16)
            .max(self.advances.len() as u16);
        let long_metrics: Vec<_> = self
            .advances
            .iter()
            .map(|advance| LongMetric {
                advance: *advance,
                side_bearing: 0,
            })
            .collect();
        let lsbs = vec![0; num_glyphs as usize - long_metrics.len()];

        let head = Head {
            units_per_em: self.upm,
            ..Default::default()
        };
        let hhea = Hhea {
            advance_width_max: self.advances.iter().max().copied().unwrap_or_default().into(),
            number_of_h_metrics: long_metrics.len() as u16,
            ..Default::default()
        };
        let maxp = Maxp {
            num_glyphs,
            ..Default::default()
        };

        let mut builder = TableBuilder::new();
        builder.add_table(&head).unwrap();
        builder.add_table(&hhea).unwrap();
        builder.add_table(&maxp).unwrap();
        builder.add_table(&Hmtx::new(long_metrics, lsbs)).unwrap();
        builder.add_raw(Tag::new(b"OS/2"), self.os2());

        if let Some(instances) = self.instances {
            let axis = VariationAxisRecord {
                axis_tag: Tag::new(b"wght"),
                min_value: Fixed::from_f64(100.0),
                default_value: Fixed::from_f64(400.0),
                max_value: Fixed::from_f64(900.0),
                ..Default::default()
            };
            let instances = (0..instances)
                .map(|i| InstanceRecord {
                    coordinates: vec![Fixed::from_f64(100.0 + 100.0 * i as f64)],
                    ..Default::default()
                })
                .collect();
            let fvar = Fvar::new(AxisInstanceArrays::new(vec![axis], instances));
            builder.add_table(&fvar).unwrap();
        }
        builder.build()
    }

    pub(crate) fn build_font(&self, name: &str) -> TtFont {
        TtFont::new(Path::new(name), self.build()).unwrap()
    }

    pub(crate) fn write(&self, path: &Path) -> PathBuf {
        fs::write(path, self.build()).unwrap();
        path.to_path_buf()
    }
}

/// Run to completion, insisting the event stream is well formed.
pub(crate) fn run_collect(runner: &mut CheckRunner) -> Vec<Event> {
    let mut validator = ProtocolValidator::default();
    let mut collector = Collector::default();
    for event in runner.events() {
        validator.receive(&event);
        collector.receive(&event);
    }
    validator.finish().unwrap();
    collector.into_events()
}
