//! Impact metric columns and the category lookup table
//!
//! An engine result is a list of `(category, amount, unit)` rows per LCIA
//! method. Each `(method, category)` pair maps to at most one output column;
//! pairs not in [`IMPACT_TABLE`] are ignored.

use super::process::ImpactValue;

/// Fixed set of impact columns written for every run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImpactMetric {
    Gwp,
    GwpBiogenicEmissions,
    GwpBiogenicUptake,
    Acidification,
    Eutrophication,
    OzoneDepletion,
    SmogFormation,
    GwpAr5,
    GwpEf2,
    GwpCml,
}

impl ImpactMetric {
    pub const ALL: [ImpactMetric; 10] = [
        ImpactMetric::Gwp,
        ImpactMetric::GwpBiogenicEmissions,
        ImpactMetric::GwpBiogenicUptake,
        ImpactMetric::Acidification,
        ImpactMetric::Eutrophication,
        ImpactMetric::OzoneDepletion,
        ImpactMetric::SmogFormation,
        ImpactMetric::GwpAr5,
        ImpactMetric::GwpEf2,
        ImpactMetric::GwpCml,
    ];

    /// Output column name
    pub fn column(&self) -> &'static str {
        match self {
            ImpactMetric::Gwp => "gwp",
            ImpactMetric::GwpBiogenicEmissions => "gwp_be",
            ImpactMetric::GwpBiogenicUptake => "gwp_bu",
            ImpactMetric::Acidification => "ap",
            ImpactMetric::Eutrophication => "ep",
            ImpactMetric::OzoneDepletion => "odp",
            ImpactMetric::SmogFormation => "pocp",
            ImpactMetric::GwpAr5 => "gwp_AR5",
            ImpactMetric::GwpEf2 => "gwp_EF2",
            ImpactMetric::GwpCml => "gwp_CML",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }

    /// Climate-change totals are reported to 4 decimals
    fn is_rounded(&self) -> bool {
        matches!(
            self,
            ImpactMetric::Gwp | ImpactMetric::GwpAr5 | ImpactMetric::GwpEf2 | ImpactMetric::GwpCml
        )
    }
}

const TRACI: [&str; 2] = ["TRACI 2.1", "TRACI 2.1 (openIMPACT)"];

/// `(method, category) -> column` mapping
pub static IMPACT_TABLE: &[(&str, &str, ImpactMetric)] = &[
    (TRACI[0], "Global warming", ImpactMetric::Gwp),
    (TRACI[1], "Global warming", ImpactMetric::Gwp),
    (
        TRACI[0],
        "Global warming - biogenic emissions",
        ImpactMetric::GwpBiogenicEmissions,
    ),
    (
        TRACI[1],
        "Global warming - biogenic emissions",
        ImpactMetric::GwpBiogenicEmissions,
    ),
    (
        TRACI[0],
        "Global warming - biogenic uptake",
        ImpactMetric::GwpBiogenicUptake,
    ),
    (
        TRACI[1],
        "Global warming - biogenic uptake",
        ImpactMetric::GwpBiogenicUptake,
    ),
    (TRACI[0], "Acidification", ImpactMetric::Acidification),
    (TRACI[1], "Acidification", ImpactMetric::Acidification),
    (TRACI[0], "Eutrophication", ImpactMetric::Eutrophication),
    (TRACI[1], "Eutrophication", ImpactMetric::Eutrophication),
    (TRACI[0], "Ozone depletion", ImpactMetric::OzoneDepletion),
    (TRACI[1], "Ozone depletion", ImpactMetric::OzoneDepletion),
    (TRACI[0], "Smog formation", ImpactMetric::SmogFormation),
    (TRACI[1], "Smog formation", ImpactMetric::SmogFormation),
    ("IPCC 2013 GWP 100a", "IPCC GWP 100a", ImpactMetric::GwpAr5),
    (
        "EF Method (adapted)",
        "Climate change - fossil",
        ImpactMetric::GwpEf2,
    ),
    (
        "CML-IA baseline",
        "Global warming (GWP100a)",
        ImpactMetric::GwpCml,
    ),
];

/// Look up the output column for a method's impact category
pub fn metric_for(method: &str, category: &str) -> Option<ImpactMetric> {
    IMPACT_TABLE
        .iter()
        .find(|(m, c, _)| *m == method && *c == category)
        .map(|(_, _, metric)| *metric)
}

/// One value per [`ImpactMetric`]; unset metrics are NaN
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImpactVector([f64; 10]);

impl Default for ImpactVector {
    fn default() -> Self {
        Self([f64::NAN; 10])
    }
}

impl ImpactVector {
    pub fn get(&self, metric: ImpactMetric) -> f64 {
        self.0[metric.index()]
    }

    pub fn set(&mut self, metric: ImpactMetric, value: f64) {
        self.0[metric.index()] = value;
    }

    /// Fold one method's result rows into the vector.
    ///
    /// Returns the number of rows that mapped to a column.
    pub fn absorb(&mut self, method: &str, impacts: &[ImpactValue]) -> usize {
        let mut mapped = 0;
        for impact in impacts {
            match metric_for(method, &impact.category) {
                Some(metric) => {
                    self.set(metric, impact.amount);
                    mapped += 1;
                }
                None => {
                    tracing::debug!(
                        method,
                        category = %impact.category,
                        "Impact category has no output column"
                    );
                }
            }
        }
        mapped
    }

    /// Values in column order, with climate-change totals rounded
    pub fn output_values(&self) -> [f64; 10] {
        let mut out = self.0;
        for metric in ImpactMetric::ALL {
            if metric.is_rounded() {
                let v = out[metric.index()];
                out[metric.index()] = (v * 1e4).round() / 1e4;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn impact(category: &str, amount: f64) -> ImpactValue {
        ImpactValue {
            category: category.to_string(),
            amount,
            unit: "kg".to_string(),
        }
    }

    #[test]
    fn test_column_order_matches_all() {
        let columns: Vec<_> = ImpactMetric::ALL.iter().map(|m| m.column()).collect();
        assert_eq!(
            columns,
            [
                "gwp", "gwp_be", "gwp_bu", "ap", "ep", "odp", "pocp", "gwp_AR5", "gwp_EF2",
                "gwp_CML"
            ]
        );
        for (i, m) in ImpactMetric::ALL.iter().enumerate() {
            assert_eq!(m.index(), i);
        }
    }

    #[test]
    fn test_same_category_name_different_method_is_not_mapped() {
        // "Global warming" only counts for TRACI
        assert_eq!(metric_for("CML-IA baseline", "Global warming"), None);
        assert_eq!(
            metric_for("TRACI 2.1 (openIMPACT)", "Global warming"),
            Some(ImpactMetric::Gwp)
        );
    }

    #[test]
    fn test_absorb_sets_mapped_and_leaves_rest_nan() {
        let mut v = ImpactVector::default();
        let mapped = v.absorb(
            "TRACI 2.1",
            &[
                impact("Global warming", 1.234_567),
                impact("Acidification", 0.01),
                impact("Carcinogenics", 9.0),
            ],
        );
        assert_eq!(mapped, 2);
        assert_eq!(v.get(ImpactMetric::Acidification), 0.01);
        assert!(v.get(ImpactMetric::GwpCml).is_nan());

        let out = v.output_values();
        assert_eq!(out[0], 1.2346);
        assert!(out[9].is_nan());
    }
}
