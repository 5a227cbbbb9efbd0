use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Version of the operation vocabulary below. Bump when kinds are added or
/// their argument schemas change.
pub const OPERATION_VOCABULARY_VERSION: u32 = 1;

/// Whether a call draws data or decorates the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallCategory {
    Data,
    Decoration,
}

/// Positional argument schema of one operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgSchema {
    pub names: &'static [&'static str],
    pub min_positional: usize,
}

/// Closed set of replayable drawing operations.
///
/// Names outside the vocabulary deserialize into [`Operation::Unknown`] so
/// newer recipes still load; such calls are never replayed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operation {
    Plot,
    Scatter,
    Bar,
    Barh,
    Hist,
    FillBetween,
    Errorbar,
    Step,
    Stem,
    Fill,
    Imshow,
    SetTitle,
    SetXLabel,
    SetYLabel,
    SetXLim,
    SetYLim,
    Legend,
    Grid,
    AxHLine,
    AxVLine,
    AxHSpan,
    AxVSpan,
    Text,
    Annotate,
    Unknown(String),
}

const KNOWN: &[Operation] = &[
    Operation::Plot,
    Operation::Scatter,
    Operation::Bar,
    Operation::Barh,
    Operation::Hist,
    Operation::FillBetween,
    Operation::Errorbar,
    Operation::Step,
    Operation::Stem,
    Operation::Fill,
    Operation::Imshow,
    Operation::SetTitle,
    Operation::SetXLabel,
    Operation::SetYLabel,
    Operation::SetXLim,
    Operation::SetYLim,
    Operation::Legend,
    Operation::Grid,
    Operation::AxHLine,
    Operation::AxVLine,
    Operation::AxHSpan,
    Operation::AxVSpan,
    Operation::Text,
    Operation::Annotate,
];

impl Operation {
    /// Every replayable kind, in vocabulary order.
    #[must_use]
    pub fn vocabulary() -> &'static [Operation] {
        KNOWN
    }

    #[must_use]
    pub fn from_name(name: &str) -> Self {
        KNOWN
            .iter()
            .find(|op| op.name() == name)
            .cloned()
            .unwrap_or_else(|| Self::Unknown(name.to_owned()))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Plot => "plot",
            Self::Scatter => "scatter",
            Self::Bar => "bar",
            Self::Barh => "barh",
            Self::Hist => "hist",
            Self::FillBetween => "fill_between",
            Self::Errorbar => "errorbar",
            Self::Step => "step",
            Self::Stem => "stem",
            Self::Fill => "fill",
            Self::Imshow => "imshow",
            Self::SetTitle => "set_title",
            Self::SetXLabel => "set_xlabel",
            Self::SetYLabel => "set_ylabel",
            Self::SetXLim => "set_xlim",
            Self::SetYLim => "set_ylim",
            Self::Legend => "legend",
            Self::Grid => "grid",
            Self::AxHLine => "axhline",
            Self::AxVLine => "axvline",
            Self::AxHSpan => "axhspan",
            Self::AxVSpan => "axvspan",
            Self::Text => "text",
            Self::Annotate => "annotate",
            Self::Unknown(name) => name,
        }
    }

    #[must_use]
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }

    #[must_use]
    pub fn category(&self) -> CallCategory {
        match self {
            Self::SetTitle
            | Self::SetXLabel
            | Self::SetYLabel
            | Self::SetXLim
            | Self::SetYLim
            | Self::Legend
            | Self::Grid
            | Self::AxHLine
            | Self::AxVLine
            | Self::AxHSpan
            | Self::AxVSpan
            | Self::Text
            | Self::Annotate => CallCategory::Decoration,
            _ => CallCategory::Data,
        }
    }

    /// Draw priority when the caller does not pass `zorder`.
    #[must_use]
    pub fn default_z_order(&self) -> i32 {
        match self {
            Self::AxHSpan | Self::AxVSpan | Self::Grid | Self::Imshow => 1,
            Self::Text
            | Self::Annotate
            | Self::Legend
            | Self::SetTitle
            | Self::SetXLabel
            | Self::SetYLabel => 3,
            _ => 2,
        }
    }

    #[must_use]
    pub fn arg_schema(&self) -> ArgSchema {
        let (names, min_positional): (&'static [&'static str], usize) = match self {
            Self::Plot => (&["x", "y", "fmt"], 1),
            Self::Scatter => (&["x", "y", "s", "c"], 2),
            Self::Bar => (&["x", "height", "width", "bottom"], 2),
            Self::Barh => (&["y", "width", "height", "left"], 2),
            Self::Hist => (&["x", "bins"], 1),
            Self::FillBetween => (&["x", "y1", "y2"], 2),
            Self::Errorbar => (&["x", "y", "yerr", "xerr"], 2),
            Self::Step | Self::Stem | Self::Fill => (&["x", "y"], 2),
            Self::Imshow => (&["X"], 1),
            Self::SetTitle => (&["label"], 1),
            Self::SetXLabel | Self::SetYLabel => (&["label"], 1),
            Self::SetXLim | Self::SetYLim => (&["left", "right"], 2),
            Self::Legend => (&["labels"], 0),
            Self::Grid => (&["visible"], 0),
            Self::AxHLine => (&["y"], 0),
            Self::AxVLine => (&["x"], 0),
            Self::AxHSpan => (&["ymin", "ymax"], 2),
            Self::AxVSpan => (&["xmin", "xmax"], 2),
            Self::Text => (&["x", "y", "s"], 3),
            Self::Annotate => (&["text", "xy", "xytext"], 2),
            Self::Unknown(_) => (&[], 0),
        };
        ArgSchema {
            names,
            min_positional,
        }
    }

    /// Name of the `index`-th positional argument, `arg{index}` beyond the schema.
    #[must_use]
    pub fn arg_name(&self, index: usize) -> String {
        self.arg_schema()
            .names
            .get(index)
            .map_or_else(|| format!("arg{index}"), |name| (*name).to_owned())
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for Operation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Operation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Self::from_name(&name))
    }
}

#[cfg(test)]
mod tests {
    use super::{CallCategory, Operation};

    #[test]
    fn vocabulary_names_round_trip() {
        for op in Operation::vocabulary() {
            assert_eq!(&Operation::from_name(op.name()), op);
        }
    }

    #[test]
    fn unknown_names_are_kept_verbatim() {
        let op: Operation = serde_json::from_str("\"violinplot\"").expect("parse");
        assert_eq!(op, Operation::Unknown("violinplot".to_owned()));
        assert!(!op.is_known());
        assert_eq!(serde_json::to_string(&op).expect("serialize"), "\"violinplot\"");
    }

    #[test]
    fn classification_splits_data_and_decorations() {
        assert_eq!(Operation::Plot.category(), CallCategory::Data);
        assert_eq!(Operation::SetTitle.category(), CallCategory::Decoration);
        assert_eq!(Operation::AxVSpan.category(), CallCategory::Decoration);
        assert_eq!(Operation::Plot.arg_name(5), "arg5");
    }
}
