//! RG-010: AWS resource types — computed attributes and tag support.

/// Types that reject a `tags` attribute.
pub const UNTAGGABLE: &[&str] = &[
    "aws_iam_role_policy",
    "aws_iam_role_policy_attachment",
    "aws_iam_policy_attachment",
    "aws_lambda_permission",
    "aws_s3_bucket_policy",
];

/// Type-specific computed attributes (beyond `id` and `arn`).
pub fn computed_attributes(resource_type: &str) -> &'static [&'static str] {
    match resource_type {
        "aws_iam_role" => &["unique_id", "create_date"],
        "aws_iam_policy" => &["policy_id"],
        "aws_iam_role_policy" => &["role"],
        "aws_lambda_function" => &[
            "invoke_arn",
            "qualified_arn",
            "version",
            "last_modified",
            "source_code_size",
        ],
        "aws_sfn_state_machine" => &["creation_date", "status"],
        "aws_s3_bucket" => &[
            "bucket_domain_name",
            "bucket_regional_domain_name",
            "hosted_zone_id",
            "region",
        ],
        "aws_dynamodb_table" => &["stream_arn", "stream_label"],
        _ => &[],
    }
}
