//! DB cluster ARN parsing

use std::fmt;
use std::str::FromStr;

use regex::Regex;

const CLUSTER_RESOURCE: &str = r"^cluster:([0-9a-z-]+)$";

/// `arn:<partition>:rds:<region>:<account>:cluster:<identifier>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterArn {
    pub partition: String,
    pub region: String,
    pub account_id: String,
    pub cluster_identifier: String,
}

impl ClusterArn {
    pub fn parse(arn: &str) -> Result<Self, String> {
        let parts: Vec<&str> = arn.splitn(6, ':').collect();
        if parts.len() != 6 || parts[0] != "arn" {
            return Err(format!("'{}' is not an ARN", arn));
        }
        if parts[2] != "rds" {
            return Err(format!("'{}' is not an RDS ARN (service '{}')", arn, parts[2]));
        }

        let re = Regex::new(CLUSTER_RESOURCE).map_err(|e| e.to_string())?;
        let captures = re
            .captures(parts[5])
            .ok_or_else(|| format!("'{}' is not a DB cluster ARN", arn))?;

        Ok(Self {
            partition: parts[1].to_string(),
            region: parts[3].to_string(),
            account_id: parts[4].to_string(),
            cluster_identifier: captures[1].to_string(),
        })
    }
}

impl FromStr for ClusterArn {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ClusterArn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "arn:{}:rds:{}:{}:cluster:{}",
            self.partition, self.region, self.account_id, self.cluster_identifier
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_cluster_arn() {
        let arn = ClusterArn::parse("arn:aws:rds:us-east-1:123456789012:cluster:db-1").unwrap();
        assert_eq!(arn.partition, "aws");
        assert_eq!(arn.region, "us-east-1");
        assert_eq!(arn.account_id, "123456789012");
        assert_eq!(arn.cluster_identifier, "db-1");
        assert_eq!(
            arn.to_string(),
            "arn:aws:rds:us-east-1:123456789012:cluster:db-1"
        );
    }

    #[test]
    fn parse_other_partition() {
        let arn: ClusterArn = "arn:aws-cn:rds:cn-north-1:123456789012:cluster:db-1-old1"
            .parse()
            .unwrap();
        assert_eq!(arn.partition, "aws-cn");
        assert_eq!(arn.cluster_identifier, "db-1-old1");
    }

    #[test]
    fn reject_non_cluster_arns() {
        assert!(ClusterArn::parse("db-1").is_err());
        assert!(ClusterArn::parse("arn:aws:rds:us-east-1:123456789012:db:instance-1").is_err());
        assert!(ClusterArn::parse("arn:aws:s3:::bucket").is_err());
        assert!(ClusterArn::parse("arn:aws:rds:us-east-1:123456789012:cluster:DB_1").is_err());
    }
}
