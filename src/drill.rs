//! Excellon drill export of the round apertures of an image.
//!
//! Every circular aperture becomes a tool, every flash of that aperture a hit. Coordinates are written in
//! 1/10000 inch with trailing zeros kept (`INCH,TZ`).

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};
use thiserror::Error;

use crate::image::{ApertureState, Image};

#[derive(Error, Debug)]
pub enum DrillExportError {
    #[error("unable to open drill file for writing. path: {path:?}, cause: {source}")]
    Open { path: PathBuf, source: io::Error },
    #[error("unable to write drill file. path: {path:?}, cause: {source}")]
    Write { path: PathBuf, source: io::Error },
}

fn to_drill_units(value: f64) -> i64 {
    (value * 10000.0 + 0.5).floor() as i64
}

/// Writes the drill program for `image` to `writer`.
#[profiling::function]
pub fn write_drill<W: Write>(image: &Image, mut writer: W) -> io::Result<()> {
    writeln!(writer, "M48")?;
    writeln!(writer, "INCH,TZ")?;

    let tools = image
        .apertures()
        .filter(|(_, aperture)| aperture.is_circle())
        .map(|(index, aperture)| (index, aperture.line_width()))
        .collect::<Vec<_>>();

    for (index, diameter) in &tools {
        writeln!(writer, "T{}C{:.3}", index, diameter)?;
    }
    writeln!(writer, "%")?;

    for (index, _diameter) in &tools {
        writeln!(writer, "T{}", index)?;

        let hits = image
            .nets()
            .iter()
            .filter(|net| net.aperture == *index && net.aperture_state == ApertureState::Flash);

        let mut count = 0;
        for net in hits {
            writeln!(writer, "X{:06}Y{:06}", to_drill_units(net.stop.x), to_drill_units(net.stop.y))?;
            count += 1;
        }
        debug!("drill tool written. tool: T{}, hits: {}", index, count);
    }

    writeln!(writer, "M30")?;
    writeln!(writer)?;
    writer.flush()
}

/// Creates (or truncates) the file at `path` and writes the drill program for `image` into it.
pub fn export_drill_file(path: impl AsRef<Path>, image: &Image) -> Result<(), DrillExportError> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|source| DrillExportError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    write_drill(image, BufWriter::new(file)).map_err(|source| DrillExportError::Write {
        path: path.to_path_buf(),
        source,
    })?;

    info!("exported drill file. path: {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::env;

    use rstest::rstest;

    use super::*;
    use crate::image::{Aperture, Net};
    use crate::spacial::Position;
    use crate::testing::image_with_apertures;

    fn drill_text(image: &Image) -> String {
        let mut buffer = Vec::new();
        write_drill(image, &mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn two_hits_with_one_tool() {
        // given
        let mut image = image_with_apertures([(10, Aperture::circle(0.016))]);
        image.push_net(Net::flash(10, Position::new(0.1, 0.2)));
        image.push_net(Net::flash(10, Position::new(0.3, 0.4)));

        // when
        let text = drill_text(&image);

        // then
        assert_eq!(text, "M48\nINCH,TZ\nT10C0.016\n%\nT10\nX001000Y002000\nX003000Y004000\nM30\n\n");
    }

    #[test]
    fn only_round_apertures_become_tools() {
        // given
        let mut image = image_with_apertures([
            (12, Aperture::circle(0.04)),
            (10, Aperture::rectangle(0.05, 0.05)),
            (11, Aperture::circle(0.0312)),
        ]);
        image.push_net(Net::flash(12, Position::new(1.0, 1.0)));
        image.push_net(Net::flash(10, Position::new(2.0, 2.0)));
        image.push_net(Net::flash(11, Position::new(3.0, 3.0)));
        image.push_net(Net::flash(12, Position::new(4.0, 4.0)));

        // when
        let text = drill_text(&image);

        // then
        assert_eq!(
            text,
            "M48\nINCH,TZ\nT11C0.031\nT12C0.040\n%\nT11\nX030000Y030000\nT12\nX010000Y010000\nX040000Y040000\nM30\n\n"
        );
    }

    #[test]
    fn strokes_and_moves_are_not_hits() {
        let mut image = image_with_apertures([(10, Aperture::circle(0.02))]);
        image.push_net(Net::moved(10, Position::new(0.0, 0.0), Position::new(1.0, 1.0)));
        image.push_net(Net::line(10, Position::new(1.0, 1.0), Position::new(2.0, 2.0)));

        let text = drill_text(&image);

        assert_eq!(text, "M48\nINCH,TZ\nT10C0.020\n%\nT10\nM30\n\n");
    }

    #[rstest]
    #[case(0.0, 0)]
    #[case(0.00004, 0)]
    #[case(0.00006, 1)]
    #[case(1.23456, 12346)]
    #[case(-0.1, -1000)]
    fn drill_units(#[case] value: f64, #[case] expected: i64) {
        assert_eq!(to_drill_units(value), expected);
    }

    #[test]
    fn negative_coordinates_keep_their_sign() {
        let mut image = image_with_apertures([(10, Aperture::circle(0.02))]);
        image.push_net(Net::flash(10, Position::new(-0.1, 0.2)));

        let text = drill_text(&image);

        assert!(text.contains("\nX-01000Y002000\n"));
    }

    #[test]
    fn export_to_file() {
        // given
        let mut image = image_with_apertures([(10, Aperture::circle(0.016))]);
        image.push_net(Net::flash(10, Position::new(0.1, 0.2)));
        let path = env::temp_dir().join(format!("drill_export_{}.drl", std::process::id()));

        // when
        export_drill_file(&path, &image).unwrap();

        // then
        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(text, drill_text(&image));
    }

    #[test]
    fn unwritable_path_reports_the_path() {
        let image = Image::new();
        let path = env::temp_dir()
            .join("missing_directory_for_drill_export")
            .join("out.drl");

        let result = export_drill_file(&path, &image);

        match result {
            Err(DrillExportError::Open {
                path: reported, ..
            }) => assert_eq!(reported, path),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
