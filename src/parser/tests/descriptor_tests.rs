//! Project descriptor traversal tests.

use crate::config::ParserOptions;
use crate::error::SiteError;
use crate::parser::XmlNode;
use crate::parser::descriptor::parse_descriptor;

fn tile_layer(metadata_location: &str, pixel_size: &str) -> String {
    format!(
        r#"<Layer i:type="TileLayer">
            <metaDataLocation>{metadata_location}</metaDataLocation>
            <totalHfw unit="m" Value="3.8912E-06"/>
            <tileHfw unit="m" Value="2.048E-06"/>
            <overlapHorizontal><a:double>10</a:double></overlapHorizontal>
            <overlapVertical><a:double>10</a:double></overlapVertical>
            <rotation unit="deg" Value="0"/>
            <rows>2</rows>
            <columns>2</columns>
            <scanResolution><b:height>2048</b:height><b:width>2048</b:width></scanResolution>
            <pixelSize unit="m" Value="{pixel_size}"/>
            <StagePosition><c:x>0.001</c:x><c:y>0.002</c:y></StagePosition>
        </Layer>"#
    )
}

fn annotation_layer(name: &str, is_area: &str, x: &str, y: &str) -> String {
    format!(
        r#"<Layer i:type="AnnotationLayer">
            <isArea>{is_area}</isArea>
            <RealDisplayName>{name}</RealDisplayName>
            <StagePosition><c:x>{x}</c:x><c:y>{y}</c:y></StagePosition>
        </Layer>"#
    )
}

fn project(highmag_layers: &str, other_layers: &str) -> String {
    format!(
        r#"<MapsProject xmlns:i="http://www.w3.org/2001/XMLSchema-instance"
                        xmlns:a="urn:arrays" xmlns:b="urn:scan" xmlns:c="urn:sal">
            <LayerGroups>
                <LayerGroup>
                    <displayName>highmag</displayName>
                    <Layers>{highmag_layers}</Layers>
                </LayerGroup>
                <LayerGroup>
                    <displayName>overview</displayName>
                    <Layers>{other_layers}</Layers>
                </LayerGroup>
            </LayerGroups>
        </MapsProject>"#
    )
}

#[test]
fn test_extracts_layers_and_annotations() {
    let xml = project(
        &format!(
            "{}{}",
            tile_layer("LayersData\\sq-1\\metadata", "1E-09"),
            annotation_layer("fork_1", "false", "0.0011", "0.0021")
        ),
        &annotation_layer("fork_2", "false", "0.0012", "0.0022"),
    );
    let root = XmlNode::parse_str(&xml).unwrap();
    let data = parse_descriptor(&root, &ParserOptions::new()).unwrap();

    assert_eq!(data.layers.len(), 1);
    let layer = &data.layers["LayersData\\sq-1\\metadata"];
    assert_eq!(layer.rows, 2);
    assert_eq!(layer.columns, 2);
    assert_eq!(layer.rotation_degrees, 0.0);
    assert_eq!(layer.tile_hfw, 2.048e-6);
    assert_eq!(layer.center.x, 0.001);
    assert_eq!(layer.center.y, 0.002);
    // Overlap percentages are normalized to fractions.
    assert_eq!(layer.overlap_horizontal, 0.1);
    assert_eq!(layer.overlap_vertical, 0.1);

    assert_eq!(data.geometry.pixel_size, 1e-9);
    assert_eq!(data.geometry.image_width, 2048);
    assert_eq!(data.geometry.image_height, 2048);

    // Annotations are collected from every group, not only highmag.
    let names: Vec<&str> = data
        .annotations
        .iter()
        .map(|a| a.name.as_str())
        .collect();
    assert_eq!(names, vec!["fork_1", "fork_2"]);
    assert_eq!(data.annotations[1].stage_position.x, 0.0012);
}

#[test]
fn test_area_annotations_are_skipped() {
    let xml = project(
        &format!(
            "{}{}",
            tile_layer("LayersData\\sq-1\\metadata", "1E-09"),
            annotation_layer("area_1", "true", "0.0", "0.0")
        ),
        "",
    );
    let root = XmlNode::parse_str(&xml).unwrap();
    let data = parse_descriptor(&root, &ParserOptions::new()).unwrap();
    assert!(data.annotations.is_empty());
}

#[test]
fn test_tile_layers_outside_highmag_are_ignored() {
    let xml = project(
        &tile_layer("LayersData\\sq-1\\metadata", "1E-09"),
        &tile_layer("LayersData\\overview\\metadata", "5E-08"),
    );
    let root = XmlNode::parse_str(&xml).unwrap();
    let data = parse_descriptor(&root, &ParserOptions::new()).unwrap();

    // Only the highmag layer is extracted, so the diverging overview pixel
    // size never reaches the consistency check.
    assert_eq!(data.layers.len(), 1);
    assert!(data.layers.contains_key("LayersData\\sq-1\\metadata"));
}

#[test]
fn test_nested_layer_groups_are_recursed() {
    let nested = format!(
        r#"<Layer i:type="LayerGroup">
            <displayName>nested</displayName>
            <Layers>{}</Layers>
        </Layer>"#,
        annotation_layer("fork_nested", "false", "0.003", "0.004")
    );
    let xml = project(&tile_layer("LayersData\\sq-1\\metadata", "1E-09"), &nested);
    let root = XmlNode::parse_str(&xml).unwrap();
    let data = parse_descriptor(&root, &ParserOptions::new()).unwrap();

    assert_eq!(data.annotations.len(), 1);
    assert_eq!(data.annotations[0].name, "fork_nested");
}

#[test]
fn test_inconsistent_pixel_size_is_fatal() {
    let xml = project(
        &format!(
            "{}{}",
            tile_layer("LayersData\\sq-1\\metadata", "1E-09"),
            tile_layer("LayersData\\sq-2\\metadata", "2E-09")
        ),
        "",
    );
    let root = XmlNode::parse_str(&xml).unwrap();
    let result = parse_descriptor(&root, &ParserOptions::new());
    assert!(matches!(
        result,
        Err(SiteError::ConfigurationInconsistency { field, .. }) if field == "Pixel size"
    ));
}

#[test]
fn test_inconsistent_scan_resolution_is_fatal() {
    let second = tile_layer("LayersData\\sq-2\\metadata", "1E-09")
        .replace("<b:height>2048</b:height>", "<b:height>4096</b:height>");
    let xml = project(
        &format!("{}{second}", tile_layer("LayersData\\sq-1\\metadata", "1E-09")),
        "",
    );
    let root = XmlNode::parse_str(&xml).unwrap();
    let result = parse_descriptor(&root, &ParserOptions::new());
    assert!(matches!(
        result,
        Err(SiteError::ConfigurationInconsistency { field, .. }) if field == "Image height"
    ));
}

#[test]
fn test_no_tile_layers_is_distinguishable() {
    let xml = project("", &annotation_layer("fork_1", "false", "0.0", "0.0"));
    let root = XmlNode::parse_str(&xml).unwrap();
    let result = parse_descriptor(&root, &ParserOptions::new());
    assert!(matches!(result, Err(SiteError::NoTileLayers)));
}

#[test]
fn test_unknown_layer_kind_is_skipped() {
    let unknown = r#"<Layer i:type="DrawingLayer"><name>scribble</name></Layer>"#;
    let xml = project(
        &format!("{}{unknown}", tile_layer("LayersData\\sq-1\\metadata", "1E-09")),
        "",
    );
    let root = XmlNode::parse_str(&xml).unwrap();
    let data = parse_descriptor(&root, &ParserOptions::new()).unwrap();
    assert_eq!(data.layers.len(), 1);
}

#[test]
fn test_missing_required_layer_field_is_fatal() {
    let broken = tile_layer("LayersData\\sq-1\\metadata", "1E-09")
        .replace("<rotation unit=\"deg\" Value=\"0\"/>", "");
    let xml = project(&broken, "");
    let root = XmlNode::parse_str(&xml).unwrap();
    let result = parse_descriptor(&root, &ParserOptions::new());
    assert!(matches!(
        result,
        Err(SiteError::InvalidDescriptor { message }) if message.contains("rotation")
    ));
}

#[test]
fn test_alternate_highmag_group_name() {
    let xml = project(&tile_layer("LayersData\\sq-1\\metadata", "1E-09"), "")
        .replace("<displayName>highmag</displayName>", "<displayName>em-grid</displayName>");
    let root = XmlNode::parse_str(&xml).unwrap();

    let default_options = ParserOptions::new();
    assert!(matches!(
        parse_descriptor(&root, &default_options),
        Err(SiteError::NoTileLayers)
    ));

    let renamed = ParserOptions::new().highmag_layer("em-grid");
    let data = parse_descriptor(&root, &renamed).unwrap();
    assert_eq!(data.layers.len(), 1);
}
