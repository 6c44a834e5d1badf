use crate::fields::{LocationFields, TargetField};
use crate::provider::{AddressComponent, ProviderKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NameForm {
    Long,
    Short,
}

struct FieldRule {
    field: TargetField,
    form: NameForm,
    sources: &'static [&'static str],
}

const fn rule(field: TargetField, form: NameForm, sources: &'static [&'static str]) -> FieldRule {
    FieldRule {
        field,
        form,
        sources,
    }
}

const GOOGLE_RULES: &[FieldRule] = &[
    rule(TargetField::CountryCode, NameForm::Short, &["country"]),
    rule(TargetField::Country, NameForm::Long, &["country"]),
    rule(
        TargetField::State,
        NameForm::Long,
        &["administrative_area_level_1", "administrative_area_level_2"],
    ),
    rule(TargetField::City, NameForm::Long, &["locality"]),
    rule(
        TargetField::Location,
        NameForm::Long,
        &["sublocality_level_1", "sublocality_level_2", "route"],
    ),
];

const OPENSTREETMAP_RULES: &[FieldRule] = &[
    rule(TargetField::CountryCode, NameForm::Long, &["country_code"]),
    rule(TargetField::Country, NameForm::Long, &["country"]),
    rule(TargetField::State, NameForm::Long, &["state"]),
    rule(
        TargetField::City,
        NameForm::Long,
        &["city", "city_district", "state_district"],
    ),
    rule(
        TargetField::Location,
        NameForm::Long,
        &["county", "town", "suburb", "hamlet", "neighbourhood", "road"],
    ),
];

fn rules_for(provider: ProviderKind) -> &'static [FieldRule] {
    match provider {
        ProviderKind::Google => GOOGLE_RULES,
        ProviderKind::OpenStreetMap => OPENSTREETMAP_RULES,
    }
}

/// Maps provider address components onto location fields.
///
/// Each field walks its source types in table order and takes the first
/// component of that type carrying a non-empty value, so a lower priority
/// type never wins just because the provider listed it first.
pub fn map_components(components: &[AddressComponent], provider: ProviderKind) -> LocationFields {
    let mut fields = LocationFields::default();
    for rule in rules_for(provider) {
        let value = rule.sources.iter().find_map(|source| {
            components
                .iter()
                .filter(|component| component.kind == *source)
                .find_map(|component| pick(component, rule.form))
        });
        fields.set(rule.field, value.map(str::to_string));
    }
    fields
}

fn pick(component: &AddressComponent, form: NameForm) -> Option<&str> {
    let value = match form {
        NameForm::Long => Some(component.value.as_str()),
        NameForm::Short => component.short_value.as_deref(),
    };
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn component(kind: &str, value: &str) -> AddressComponent {
        AddressComponent::new(kind, value)
    }

    #[test]
    fn priority_table_beats_input_order() {
        let components = vec![
            component("administrative_area_level_2", "Bar"),
            component("administrative_area_level_1", "Foo"),
        ];
        let fields = map_components(&components, ProviderKind::Google);
        assert_eq!(fields.get(TargetField::State), Some("Foo"));
    }

    #[test]
    fn google_country_code_reads_short_name() {
        let components = vec![
            component("country", "Austria").with_short_value("AT"),
            component("locality", "Vienna"),
            component("route", "Stephansplatz"),
        ];
        let fields = map_components(&components, ProviderKind::Google);
        assert_eq!(fields.get(TargetField::CountryCode), Some("AT"));
        assert_eq!(fields.get(TargetField::Country), Some("Austria"));
        assert_eq!(fields.get(TargetField::City), Some("Vienna"));
        assert_eq!(fields.get(TargetField::Location), Some("Stephansplatz"));
    }

    #[test]
    fn google_scenario_leaves_unmatched_fields_empty() {
        let components = vec![component("country", "Austria"), component("locality", "Vienna")];
        let fields = map_components(&components, ProviderKind::Google);
        assert_eq!(
            fields,
            LocationFields::default()
                .with(TargetField::Country, "Austria")
                .with(TargetField::City, "Vienna")
        );
    }

    #[test]
    fn skips_empty_values_and_falls_through() {
        let components = vec![
            component("sublocality_level_1", ""),
            component("sublocality_level_2", "Josefstadt"),
        ];
        let fields = map_components(&components, ProviderKind::Google);
        assert_eq!(fields.get(TargetField::Location), Some("Josefstadt"));
    }

    #[test]
    fn openstreetmap_table() {
        let components = vec![
            component("road", "Graben"),
            component("suburb", "Innere Stadt"),
            component("city", "Wien"),
            component("state", "Wien"),
            component("country", "Österreich"),
            component("country_code", "at"),
        ];
        let fields = map_components(&components, ProviderKind::OpenStreetMap);
        assert_eq!(fields.get(TargetField::CountryCode), Some("at"));
        assert_eq!(fields.get(TargetField::Country), Some("Österreich"));
        assert_eq!(fields.get(TargetField::State), Some("Wien"));
        assert_eq!(fields.get(TargetField::City), Some("Wien"));
        assert_eq!(fields.get(TargetField::Location), Some("Innere Stadt"));
    }

    #[test]
    fn empty_input_maps_to_empty_fields() {
        assert!(map_components(&[], ProviderKind::Google).is_empty());
        let unknown = vec![component("postcode", "1010")];
        assert!(map_components(&unknown, ProviderKind::OpenStreetMap).is_empty());
    }
}
