//! Read-only analytics over the provisioned collections.
//!
//! Each report is a fixed aggregation pipeline run against one collection.
//! They assume a finished `provision` run: measurements are numeric and
//! `date` is an ISO `YYYY-MM-DD` string.

use mongodb::bson::{doc, Document};

#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub name: &'static str,
    pub collection: &'static str,
    pub description: &'static str,
    pub pipeline: Vec<Document>,
}

pub fn all() -> Vec<Report> {
    vec![location_event_averages(), seasonal_conditions(), extreme_events()]
}

pub fn named(name: &str) -> Option<Report> {
    all().into_iter().find(|r| r.name == name)
}

/// Average temperature and precipitation per location and event type,
/// for groups with more than one reading.
pub fn location_event_averages() -> Report {
    let pipeline = vec![
        doc! { "$match": { "event_type": { "$exists": true } } },
        doc! { "$group": {
            "_id": { "location": "$location", "event_type": "$event_type" },
            "avg_temp": { "$avg": "$temperature_c" },
            "avg_precip": { "$avg": "$precipitation_mm" },
            "count": { "$sum": 1 },
        } },
        doc! { "$match": { "count": { "$gt": 1 } } },
        doc! { "$sort": { "avg_temp": -1 } },
        doc! { "$project": {
            "_id": 0,
            "location": "$_id.location",
            "event_type": "$_id.event_type",
            "avg_temperature_c": { "$round": ["$avg_temp", 1] },
            "avg_precipitation_mm": { "$round": ["$avg_precip", 1] },
            "event_count": "$count",
        } },
    ];
    Report {
        name: "location-events",
        collection: "globalClimate",
        description: "average temperature and precipitation by location and event type",
        pipeline,
    }
}

fn month_between(low: i32, high: i32) -> Document {
    doc! { "$and": [
        { "$gte": [{ "$month": "$date_obj" }, low] },
        { "$lt": [{ "$month": "$date_obj" }, high] },
    ] }
}

/// Meteorological seasons (northern hemisphere) derived from `date`.
pub fn seasonal_conditions() -> Report {
    let pipeline = vec![
        doc! { "$addFields": {
            "date_obj": { "$dateFromString": { "dateString": "$date", "format": "%Y-%m-%d" } },
        } },
        doc! { "$addFields": {
            "season": { "$switch": {
                "branches": [
                    { "case": month_between(3, 6), "then": "Spring" },
                    { "case": month_between(6, 9), "then": "Summer" },
                    { "case": month_between(9, 12), "then": "Fall" },
                ],
                "default": "Winter",
            } },
        } },
        doc! { "$group": {
            "_id": { "season": "$season", "event_type": "$event_type" },
            "avg_temp": { "$avg": "$temperature_c" },
            "avg_humidity": { "$avg": "$humidity_percent" },
            "count": { "$sum": 1 },
        } },
        doc! { "$sort": { "_id.season": 1, "count": -1 } },
        doc! { "$project": {
            "_id": 0,
            "season": "$_id.season",
            "event_type": "$_id.event_type",
            "avg_temperature_c": { "$round": ["$avg_temp", 1] },
            "avg_humidity_percent": { "$round": ["$avg_humidity", 1] },
            "event_count": "$count",
        } },
    ];
    Report {
        name: "seasons",
        collection: "globalClimate",
        description: "conditions per season and event type",
        pipeline,
    }
}

fn count_if(condition: Document) -> Document {
    doc! { "$sum": { "$cond": [condition, 1, 0] } }
}

/// Locations ranked by readings past fixed extremes: above 25 °C, below
/// -5 °C, wind over 50 km/h, precipitation over 80 mm.
pub fn extreme_events() -> Report {
    let pipeline = vec![
        doc! { "$match": { "$or": [
            { "temperature_c": { "$gt": 25 } },
            { "temperature_c": { "$lt": -5 } },
            { "wind_speed_kmh": { "$gt": 50 } },
            { "precipitation_mm": { "$gt": 80 } },
        ] } },
        doc! { "$group": {
            "_id": "$location",
            "extreme_high_temp_events": count_if(doc! { "$gt": ["$temperature_c", 25] }),
            "extreme_low_temp_events": count_if(doc! { "$lt": ["$temperature_c", -5] }),
            "high_wind_events": count_if(doc! { "$gt": ["$wind_speed_kmh", 50] }),
            "heavy_rain_events": count_if(doc! { "$gt": ["$precipitation_mm", 80] }),
            "max_temp": { "$max": "$temperature_c" },
            "min_temp": { "$min": "$temperature_c" },
            "max_wind": { "$max": "$wind_speed_kmh" },
            "max_precip": { "$max": "$precipitation_mm" },
        } },
        doc! { "$addFields": {
            "total_extreme_events": { "$add": [
                "$extreme_high_temp_events",
                "$extreme_low_temp_events",
                "$high_wind_events",
                "$heavy_rain_events",
            ] },
        } },
        doc! { "$sort": { "total_extreme_events": -1 } },
        doc! { "$project": {
            "_id": 0,
            "location": "$_id",
            "extreme_high_temp_events": 1,
            "extreme_low_temp_events": 1,
            "high_wind_events": 1,
            "heavy_rain_events": 1,
            "total_extreme_events": 1,
            "temperature_range": {
                "max_c": { "$round": ["$max_temp", 1] },
                "min_c": { "$round": ["$min_temp", 1] },
            },
            "max_wind_speed_kmh": { "$round": ["$max_wind", 1] },
            "max_precipitation_mm": { "$round": ["$max_precip", 1] },
        } },
    ];
    Report {
        name: "extremes",
        collection: "usWeatherEvents",
        description: "locations ranked by extreme readings",
        pipeline,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage_names(report: &Report) -> Vec<&str> {
        report.pipeline.iter().filter_map(|stage| stage.keys().next().map(String::as_str)).collect()
    }

    #[test]
    fn reports_are_found_by_name() {
        let names: Vec<&str> = all().iter().map(|r| r.name).collect();
        assert_eq!(names, ["location-events", "seasons", "extremes"]);
        assert_eq!(named("extremes").map(|r| r.collection), Some("usWeatherEvents"));
        assert!(named("nope").is_none());
    }

    #[test]
    fn every_pipeline_ends_in_a_projection_without_id() {
        for report in all() {
            let last = report.pipeline.last().expect("stage");
            let projection = last.get_document("$project").expect("project");
            assert_eq!(projection.get_i32("_id").expect("_id"), 0, "{}", report.name);
        }
    }

    #[test]
    fn location_averages_skip_readings_without_event_type() {
        let report = location_event_averages();
        assert_eq!(stage_names(&report), ["$match", "$group", "$match", "$sort", "$project"]);
        let first = report.pipeline[0].get_document("$match").expect("match");
        assert_eq!(first.get_document("event_type").expect("filter"), &doc! { "$exists": true });
    }

    #[test]
    fn seasons_split_the_year_at_march_june_and_september() {
        let report = seasonal_conditions();
        let season = report.pipeline[1]
            .get_document("$addFields")
            .and_then(|f| f.get_document("season"))
            .and_then(|s| s.get_document("$switch"))
            .expect("switch");
        assert_eq!(season.get_str("default").expect("default"), "Winter");
        assert_eq!(season.get_array("branches").expect("branches").len(), 3);
    }
}
