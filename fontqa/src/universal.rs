//! The universal profile: checks that apply to any font.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use checkrunner::{
    Args, Check, CheckError, CheckOutput, Condition, Error, Message, Profile, ProfileBuilder,
    Section, Subresult, Value,
};
use indexmap::IndexSet;
use skrifa::{raw::TableProvider, MetadataProvider};

use crate::font::{read_error, TtFont};

pub const PROFILE_NAME: &str = "universal";
pub const UNIVERSAL: &str = "Universal";
pub const FAMILY: &str = "Family";

/// Default for `max_file_size_warn`
pub const WARN_SIZE: u64 = 1024 * 1024;
/// Default for `max_file_size_fail`
pub const FAIL_SIZE: u64 = 9 * 1024 * 1024;

/// Deviation of xAvgCharWidth we tolerate with an INFO, in font units
const ACCEPTABLE_ERROR: i32 = 10;

pub fn universal() -> Result<Profile, Error> {
    ProfileBuilder::new(PROFILE_NAME)
        .iterarg("font", "fonts")
        .expected_value("max_file_size_warn", Some(Value::from(WARN_SIZE)))
        .validator("max_file_size_warn", unsigned)
        .expected_value("max_file_size_fail", Some(Value::from(FAIL_SIZE)))
        .validator("max_file_size_fail", unsigned)
        .condition(Condition::new("ttFont", &["font"], |args| {
            let path = args.get::<PathBuf>("font")?;
            Ok(Some(Value::new(TtFont::load(&path)?)))
        }))
        .condition(Condition::new("is_ttf", &["ttFont"], |args| {
            Ok(Some(Value::from(args.get::<TtFont>("ttFont")?.has_table(b"glyf"))))
        }))
        .condition(Condition::new("is_variable_font", &["ttFont"], |args| {
            Ok(Some(Value::from(args.get::<TtFont>("ttFont")?.has_table(b"fvar"))))
        }))
        .condition(Condition::new("family_directory", &["fonts"], |args| {
            let fonts = args.list::<PathBuf>("fonts")?;
            Ok(fonts.first().map(|font| Value::new(parent(font))))
        }))
        .derived_iterable("ttFonts", "ttFont", true)
        .section(
            Section::new(UNIVERSAL)
                .with_check(
                    Check::new(
                        "file_size",
                        "Ensure files are not too large.",
                        &["font", "max_file_size_warn", "max_file_size_fail"],
                        file_size,
                    )
                    .with_rationale(
                        "Serving extremely large font files causes long waiting times \
                         for users and may make a web page unusable.",
                    )
                    .with_proposal("https://github.com/fonttools/fontbakery/issues/3320"),
                )
                .with_check(
                    Check::new(
                        "fstype",
                        "Checking OS/2 fsType does not impose restrictions.",
                        &["ttFont"],
                        fstype,
                    )
                    .with_rationale(
                        "The fsType in the OS/2 table is a legacy DRM-related field. \
                         Fonts should have it set to zero (also known as \"Installable \
                         Embedding\"), allowing them to be embedded in documents and \
                         permanently installed by applications on remote systems.",
                    )
                    .with_proposal("legacy:check/016"),
                )
                .with_check(
                    Check::new(
                        "xavgcharwidth",
                        "Check if OS/2 xAvgCharWidth is correct.",
                        &["ttFont"],
                        xavgcharwidth,
                    )
                    .with_rationale(
                        "The OS/2.xAvgCharWidth field is the average width of all \
                         non-zero width glyphs in the font. A wrong value usually \
                         points at a bug in the font compiler.",
                    )
                    .with_proposal("https://github.com/fonttools/fontbakery/issues/4829"),
                )
                .with_check(
                    Check::new(
                        "varfont/has_instances",
                        "Ensure VFs have named instances.",
                        &["ttFont"],
                        has_instances,
                    )
                    .with_conditions(&["is_variable_font"])
                    .with_rationale(
                        "Named instances must be present in all variable fonts in \
                         order not to frustrate the users' typical expectations of \
                         a traditional static font workflow.",
                    )
                    .with_proposal("https://github.com/fonttools/fontbakery/issues/2127"),
                ),
        )
        .section(
            Section::new(FAMILY)
                .with_check(
                    Check::new(
                        "family/equal_upm",
                        "Fonts have equal unit per em?",
                        &["ttFonts"],
                        equal_upm,
                    )
                    .with_rationale(
                        "Dissimilar unitsPerEm values across a family make the \
                         fonts scale differently at the same point size.",
                    ),
                )
                .with_check(
                    Check::new(
                        "family/single_directory",
                        "Checking all files are in the same directory.",
                        &["fonts", "family_directory"],
                        single_directory,
                    )
                    .with_rationale(
                        "All font files of a family are expected to be passed \
                         together from one directory; fonts from several \
                         directories are likely several families.",
                    )
                    .with_proposal("legacy:check/002"),
                ),
        )
        .build()
}

fn unsigned(value: &Value) -> Result<(), String> {
    if value.is::<u64>() {
        Ok(())
    } else {
        Err(format!("expected a number of bytes, got a {}", value.type_name()))
    }
}

fn parent(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_default()
}

fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["bytes", "KiB", "MiB", "GiB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} bytes")
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}

fn file_size(args: &Args) -> Result<CheckOutput, CheckError> {
    let font = args.get::<PathBuf>("font")?;
    let warn_size = *args.get::<u64>("max_file_size_warn")?;
    let fail_size = *args.get::<u64>("max_file_size_fail")?;
    let size = fs::metadata(font.as_path())?.len();

    let result = if size > fail_size {
        Subresult::fail(Message::new(
            "massive-font",
            format!(
                "Font file is {}, larger than limit {}",
                human_size(size),
                human_size(fail_size)
            ),
        ))
    } else if size > warn_size {
        Subresult::warn(Message::new(
            "large-font",
            format!(
                "Font file is {}; ideally it should be less than {}",
                human_size(size),
                human_size(warn_size)
            ),
        ))
    } else {
        Subresult::pass("Font file size is reasonable")
    };
    Ok(result.into())
}

const FSTYPE_RESTRICTIONS: [(u16, &str); 5] = [
    (
        0x0002,
        "The font must not be modified, embedded or exchanged in any manner \
         without first obtaining permission of the legal owner.",
    ),
    (
        0x0004,
        "The font may be embedded, and temporarily loaded on the remote system, \
         but documents that use it must not be editable.",
    ),
    (
        0x0008,
        "The font may be embedded but must only be installed temporarily on \
         other systems.",
    ),
    (0x0100, "The font may not be subsetted prior to embedding."),
    (
        0x0200,
        "Only bitmaps contained in the font may be embedded. No outline data \
         may be embedded.",
    ),
];

const FSTYPE_RESERVED: u16 = 0b1111110011110001;

fn fstype(args: &Args) -> Result<CheckOutput, CheckError> {
    let ttfont = args.get::<TtFont>("ttFont")?;
    let os2 = ttfont
        .font()?
        .os2()
        .map_err(|e| read_error(ttfont.path(), e))?;
    let value = os2.fs_type();
    if value == 0 {
        return Ok(Subresult::pass("OS/2 fsType is properly set to zero.").into());
    }

    let mut restrictions: Vec<_> = FSTYPE_RESTRICTIONS
        .iter()
        .filter(|(mask, _)| value & mask != 0)
        .map(|(_, text)| format!("* {text}"))
        .collect();
    if value & FSTYPE_RESERVED != 0 {
        restrictions
            .push("* There are reserved bits set, which indicates an invalid setting.".to_string());
    }
    let restrictions = restrictions.join("\n");
    Ok(Subresult::fail(Message::new(
        "drm",
        format!(
            "In this font fsType is set to {value} meaning that:\n{restrictions}\n\n\
             No such DRM restrictions can be enabled on the fonts we check. Please \
             fix the fsType value to 0 (Installable Embedding)."
        ),
    ))
    .into())
}

/// Weights of the latin lowercase and space for OS/2 versions before 3.
const WEIGHT_FACTORS: [(char, u32); 27] = [
    ('a', 64),
    ('b', 14),
    ('c', 27),
    ('d', 35),
    ('e', 100),
    ('f', 20),
    ('g', 14),
    ('h', 42),
    ('i', 63),
    ('j', 3),
    ('k', 6),
    ('l', 35),
    ('m', 20),
    ('n', 56),
    ('o', 56),
    ('p', 17),
    ('q', 4),
    ('r', 49),
    ('s', 56),
    ('t', 71),
    ('u', 31),
    ('v', 10),
    ('w', 18),
    ('x', 3),
    ('y', 18),
    ('z', 2),
    (' ', 166),
];

fn xavgcharwidth(args: &Args) -> Result<CheckOutput, CheckError> {
    let ttfont = args.get::<TtFont>("ttFont")?;
    let font = ttfont.font()?;
    let Ok(os2) = font.os2() else {
        return Ok(Subresult::fail(Message::new("lacks-OS/2", "Required OS/2 table is missing.")).into());
    };
    let current = os2.x_avg_char_width() as i32;
    let advances = ttfont.advances()?;

    let (expected, rule) = if os2.version() >= 3 {
        let widths: Vec<_> = advances.iter().filter(|w| **w > 0).map(|w| *w as u64).collect();
        if widths.is_empty() {
            return Ok(Subresult::fail(Message::new(
                "missing-glyphs",
                "Found no glyph width data in the hmtx table!",
            ))
            .into());
        }
        let average = widths.iter().sum::<u64>() as f64 / widths.len() as f64;
        (
            average.round() as i32,
            "the average of the widths of all glyphs in the font",
        )
    } else {
        let charmap = font.charmap();
        let mut sum = 0u32;
        for (c, weight) in WEIGHT_FACTORS {
            let Some(advance) = charmap
                .map(c)
                .and_then(|gid| advances.get(gid.to_u32() as usize))
            else {
                return Ok(Subresult::fail(Message::new(
                    "missing-glyphs",
                    "Font is missing the required latin lowercase letters and/or space.",
                ))
                .into());
            };
            sum += *advance as u32 * weight;
        }
        (
            (sum as f64 / 1000.0 + 0.5) as i32,
            "the weighted average of the widths of the latin lowercase glyphs in the font",
        )
    };

    let difference = (current - expected).abs();
    let result = if difference <= 1 {
        Subresult::pass("OS/2 xAvgCharWidth value is correct.")
    } else if difference < ACCEPTABLE_ERROR {
        Subresult::info(Message::new(
            "xAvgCharWidth-close",
            format!(
                "OS/2 xAvgCharWidth is {current} but it should be {expected} which \
                 corresponds to {rule}. These are similar values, which may be a symptom \
                 of the slightly different calculation of the xAvgCharWidth value in \
                 font editors."
            ),
        ))
    } else {
        Subresult::warn(Message::new(
            "xAvgCharWidth-wrong",
            format!(
                "OS/2 xAvgCharWidth is {current} but it should be {expected} which \
                 corresponds to {rule}. This may indicate a problem with the font editor \
                 or the compiler."
            ),
        ))
    };
    Ok(result.into())
}

fn has_instances(args: &Args) -> Result<CheckOutput, CheckError> {
    let ttfont = args.get::<TtFont>("ttFont")?;
    let fvar = ttfont
        .font()?
        .fvar()
        .map_err(|e| read_error(ttfont.path(), e))?;
    let result = if fvar.instance_count() == 0 {
        Subresult::fail(Message::new(
            "lacks-named-instances",
            "This variable font lacks named instances on the fvar table.",
        ))
    } else {
        Subresult::pass(format!("Found {} named instances.", fvar.instance_count()))
    };
    Ok(result.into())
}

fn equal_upm(args: &Args) -> Result<CheckOutput, CheckError> {
    let fonts = args.list::<TtFont>("ttFonts")?;
    let mut by_upm: BTreeMap<u16, Vec<String>> = BTreeMap::new();
    for font in fonts.iter() {
        by_upm
            .entry(font.units_per_em()?)
            .or_default()
            .push(font.path().display().to_string());
    }
    if by_upm.len() <= 1 {
        return Ok(Subresult::pass("All fonts have the same units per em.").into());
    }
    let listing: Vec<_> = by_upm
        .iter()
        .map(|(upm, paths)| format!("* {upm}: {}", paths.join(", ")))
        .collect();
    Ok(Subresult::fail(Message::new(
        "mismatch",
        format!("Fonts have different units per em:\n{}", listing.join("\n")),
    ))
    .into())
}

fn single_directory(args: &Args) -> Result<CheckOutput, CheckError> {
    let fonts = args.list::<PathBuf>("fonts")?;
    let family_directory = args.get::<PathBuf>("family_directory")?;
    let mut directories = IndexSet::new();
    directories.insert(family_directory.as_path().to_path_buf());
    directories.extend(fonts.iter().map(|font| parent(font)));
    if directories.len() == 1 {
        return Ok(Subresult::pass("All files are in the same directory.").into());
    }
    let listing: Vec<_> = directories
        .iter()
        .map(|dir| format!("{dir:?}"))
        .collect();
    Ok(Subresult::fail(Message::new(
        "single-directory",
        format!(
            "Not all fonts passed in the command line are in the same directory. \
             This may lead to bad results as the tool will interpret all font files \
             as belonging to a single font family. The detected directories are: [{}]",
            listing.join(", ")
        ),
    ))
    .into())
}
