// src/gps/epoch.rs
//! Folds auxiliary sentences (GSA, GSV, VTG) into position fixes
//!
//! A receiver reports one epoch as several sentences. Each position sentence
//! still becomes its own fix, but it is completed with whatever the rest of
//! the epoch said: DOP and fix type from GSA, satellites in view from GSV,
//! course from VTG, and the fields a GGA and an RMC with the same timestamp
//! carry for each other.

use super::data::{Fix, SentenceKind};
use super::nmea::{CourseReport, DopReport, NmeaSentence};

#[derive(Debug, Clone, Default)]
pub struct EpochMerger {
    dop: Option<DopReport>,
    satellites_visible: Option<u8>,
    course: Option<CourseReport>,
    last_position: Option<Fix>,
}

impl EpochMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb a decoded sentence; position sentences come back completed
    pub fn push(&mut self, sentence: NmeaSentence) -> Option<Fix> {
        match sentence {
            NmeaSentence::Dop(report) => {
                self.dop = Some(report);
                None
            }
            NmeaSentence::SatellitesInView(count) => {
                self.satellites_visible = Some(count);
                None
            }
            NmeaSentence::Course(course) => {
                self.course = Some(course);
                None
            }
            NmeaSentence::Position(fix) => Some(self.complete(fix)),
        }
    }

    /// Fill the gaps in `fix`; values the sentence carried itself always win.
    ///
    /// DOP and satellites in view stay until the receiver reports new ones.
    /// A VTG course is used by one fix only.
    fn complete(&mut self, mut fix: Fix) -> Fix {
        if let Some(sibling) = self
            .last_position
            .as_ref()
            .filter(|prev| prev.timestamp == fix.timestamp && prev.sentence != fix.sentence)
        {
            fix.altitude = fix.altitude.or(sibling.altitude);
            fix.satellites = fix.satellites.or(sibling.satellites);
            fix.hdop = fix.hdop.or(sibling.hdop);
            fix.speed = fix.speed.or(sibling.speed);
            fix.heading = fix.heading.or(sibling.heading);
            // only GGA reports a real quality indicator
            if sibling.sentence == SentenceKind::Gga && fix.sentence != SentenceKind::Gga {
                fix.fix_quality = sibling.fix_quality;
            }
        }

        if let Some(dop) = self.dop {
            fix.hdop = fix.hdop.or(dop.hdop);
            fix.pdop = fix.pdop.or(dop.pdop);
            fix.vdop = fix.vdop.or(dop.vdop);
            fix.fix_type = fix.fix_type.or(dop.fix_type);
        }
        fix.satellites_visible = fix.satellites_visible.or(self.satellites_visible);

        if let Some(course) = self.course.take() {
            fix.speed = fix.speed.or(course.speed);
            fix.heading = fix.heading.or(course.heading);
        }

        self.last_position = Some(fix.clone());
        fix
    }
}
