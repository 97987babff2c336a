use std::fmt;

pub const CM_PER_INCH: f64 = 2.54;

pub fn cm_to_inch(cm: f64) -> f64 {
    cm / CM_PER_INCH
}

/// 計測の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeasurementKind {
    Shoulder,
    Torso,
    Height,
}

impl MeasurementKind {
    pub const ALL: [MeasurementKind; 3] = [Self::Shoulder, Self::Torso, Self::Height];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Shoulder => "shoulder",
            Self::Torso => "torso",
            Self::Height => "height",
        }
    }
}

impl fmt::Display for MeasurementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// どの推定モードで得た値か
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Fov,
    Depth,
}

/// ピクセル・cm・インチの組。inches は常に centimeters / 2.54
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasurementTriple {
    pub pixels: f64,
    pub centimeters: f64,
    pub inches: f64,
    pub method: Method,
}

impl MeasurementTriple {
    pub fn new(pixels: f64, centimeters: f64, method: Method) -> Self {
        Self {
            pixels,
            centimeters,
            inches: cm_to_inch(centimeters),
            method,
        }
    }
}

impl fmt::Display for MeasurementTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.1} cm / {:.1} in ({:.0} px, {})",
            self.centimeters,
            self.inches,
            self.pixels,
            match self.method {
                Method::Fov => "FOV",
                Method::Depth => "depth",
            }
        )
    }
}

/// 1 フレーム分の計測結果
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Measurements {
    pub shoulder: Option<MeasurementTriple>,
    pub torso: Option<MeasurementTriple>,
    pub height: Option<MeasurementTriple>,
}

impl Measurements {
    pub fn get(&self, kind: MeasurementKind) -> Option<&MeasurementTriple> {
        match kind {
            MeasurementKind::Shoulder => self.shoulder.as_ref(),
            MeasurementKind::Torso => self.torso.as_ref(),
            MeasurementKind::Height => self.height.as_ref(),
        }
    }

    pub fn set(&mut self, kind: MeasurementKind, value: Option<MeasurementTriple>) {
        match kind {
            MeasurementKind::Shoulder => self.shoulder = value,
            MeasurementKind::Torso => self.torso = value,
            MeasurementKind::Height => self.height = value,
        }
    }

    pub fn is_empty(&self) -> bool {
        MeasurementKind::ALL.iter().all(|&k| self.get(k).is_none())
    }

    /// 存在する計測だけを列挙
    pub fn iter(&self) -> impl Iterator<Item = (MeasurementKind, &MeasurementTriple)> + '_ {
        MeasurementKind::ALL
            .into_iter()
            .filter_map(move |k| self.get(k).map(|m| (k, m)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inches_consistent() {
        let t = MeasurementTriple::new(100.0, 11.7274, Method::Fov);
        assert_eq!(t.inches, t.centimeters / 2.54);
    }

    #[test]
    fn test_measurements_empty_and_iter() {
        let mut m = Measurements::default();
        assert!(m.is_empty());
        assert_eq!(m.iter().count(), 0);

        m.set(MeasurementKind::Torso, Some(MeasurementTriple::new(150.0, 30.0, Method::Depth)));
        assert!(!m.is_empty());
        let kinds: Vec<_> = m.iter().map(|(k, _)| k).collect();
        assert_eq!(kinds, vec![MeasurementKind::Torso]);
        assert_eq!(m.get(MeasurementKind::Torso).unwrap().method, Method::Depth);
    }

    #[test]
    fn test_display() {
        let t = MeasurementTriple::new(100.0, 25.4, Method::Fov);
        assert_eq!(t.to_string(), "25.4 cm / 10.0 in (100 px, FOV)");
    }
}
